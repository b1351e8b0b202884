#![no_main]

use std::{io::Cursor, sync::Arc};

use eazdevirt::{
    decoder::{PrimitiveReader, ScrambledProfiles},
    resolver::OperandRecord,
    vm::OperandLayout,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    for layout in [OperandLayout::TokenFirst, OperandLayout::DescriptionFirst] {
        let profiles = Arc::new(ScrambledProfiles::default());
        let mut reader = PrimitiveReader::new(Cursor::new(data), profiles);

        let _ = OperandRecord::read(&mut reader, layout);
    }
});
