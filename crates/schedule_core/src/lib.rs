pub mod archive;
pub mod connections;
pub mod error;
pub mod feed;
pub mod loaders;
pub mod notice;
pub mod pipeline;
pub mod progress;
pub mod queries;
pub mod records;
pub mod service;
pub mod store;
pub mod version;

pub use archive::ArchiveContents;
pub use connections::{find_connections, Connection, ConnectionQuery, DEFAULT_CONNECTION_LIMIT};
pub use error::{
    ActivationConflictError, ImportError, MissingFilesError, NotFoundError, VersionError,
};
pub use loaders::EntityLoadSummary;
pub use notice::{ImportNotice, NoticeContainer, NoticeSeverity};
pub use pipeline::{import_archive, import_contents, ImportOptions, ImportReport};
pub use progress::{ImportProgress, NoOpProgress};
pub use queries::{StopDeparture, StopSummary, TripDetails, TripStop};
pub use records::{
    ColumnSpec, HeaderError, MissingFieldError, Record, RecordError, RecordReader, TableSchema,
};
pub use service::ScheduleService;
pub use store::{Dataset, DEFAULT_BATCH_SIZE};
pub use version::VersionManager;

pub use transit_schedule_model as model;
