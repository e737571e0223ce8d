#![no_main]

use deb_incoming::version::Version;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let Ok(v) = data.parse::<Version>() else {
        return;
    };
    let _ = v.to_string();

    // the file-name form the pool uses
    if let Ok(stripped) = v.without_epoch().parse::<Version>() {
        let _ = v.cmp(&stripped);
    }

    // the comparisons the check-add dry run leans on: against a
    // binary-only rebuild of the input, and against an epoch-bearing
    // version
    if let Ok(binnmu) = format!("{}+b1", v).parse::<Version>() {
        let _ = v.cmp(&binnmu);
        let _ = binnmu.cmp(&v);
    }
    let epoched: Version = "9:0.0~rc0-0+deb0u0".parse().unwrap();
    let _ = v.cmp(&epoched);
    let _ = epoched.cmp(&v);
});
