#![no_main]
use libfuzzer_sys::fuzz_target;
use transit_schedule_core::feed::STOP_TIMES_SCHEMA;
use transit_schedule_core::RecordReader;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    if let Ok(reader) = RecordReader::new(STOP_TIMES_SCHEMA, &text) {
        for record in reader.flatten() {
            let _ = record.parse::<u32>("stop_sequence");
        }
    }
});
