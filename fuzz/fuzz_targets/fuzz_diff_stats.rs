#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let stats = branchline::parse_diff_stats(text);
        for (path, s) in &stats {
            assert!(!path.is_empty());
            assert_eq!(s.modified, s.added + s.removed);
        }
    }
    // Invalid UTF-8 is an io error from the reader, never a panic
    let _ = branchline::parse_diff_stats_reader(data);
});
