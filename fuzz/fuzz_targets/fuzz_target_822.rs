#![no_main]

use deb_incoming::control::Paragraph;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let _ = Paragraph::parse(data);
    let _ = Paragraph::parse_all(data);
});
