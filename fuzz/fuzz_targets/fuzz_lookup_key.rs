#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let (name, ticket) = match s.split_once('|') {
            Some((n, t)) => (n, Some(t)),
            None => (s, None),
        };
        let key = decom_core::hostname::lookup_key(name, ticket);
        assert!(!key.contains('.'));
        assert_eq!(key, key.to_ascii_uppercase());
        assert_eq!(key, key.trim());
    }
});
