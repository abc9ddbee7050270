#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use websocket_dist::core::term::TermReader;
use websocket_dist::protocol::message::decode_frame;

fuzz_target!(|data: &[u8]| {
    // Fuzz the inbound frame splitter
    if let Ok(message) = decode_frame(Bytes::copy_from_slice(data)) {
        assert!(message.control().len() + message.payload().len() + 3 <= data.len());
        let _ = message.opcode();
    }

    let mut reader = TermReader::new(data);
    if reader.skip().is_ok() {
        assert!(reader.position() <= data.len());
    }
});
