#![no_main]

use std::io::Read;

use libfuzzer_sys::fuzz_target;
use multipart_spill::{Constraints, Multipart, SizeLimit};

fuzz_target!(|data: &[u8]| {
    let constraints = Constraints::new()
        .buffer_size(64)
        .max_header_size(256)
        .size_limit(SizeLimit::new().per_field(1024));

    let mut multipart = match Multipart::with_constraints(
        data,
        "multipart/form-data; boundary=X-BOUNDARY",
        None,
        constraints,
    ) {
        Ok(multipart) => multipart,
        Err(_) => return,
    };

    let mut breaks = 0;
    while breaks < 3 {
        match multipart.next_field() {
            Err(_) | Ok(None) => breaks += 1,
            Ok(Some(mut field)) => {
                let mut sink = Vec::new();
                let _ = field.read_to_end(&mut sink);
            }
        }
    }
});
