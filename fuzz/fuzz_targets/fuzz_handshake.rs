#![no_main]

use libfuzzer_sys::fuzz_target;
use websocket_dist::protocol::handshake::{
    check_challenge, check_status, decode_challenge, verify_challenge_ack,
};

fuzz_target!(|data: &[u8]| {
    // Every handshake decoder must reject garbage without panicking
    let _ = check_status(data);
    if let Ok(challenge) = decode_challenge(data) {
        let _ = check_challenge(&challenge, "peer@localhost");
    }
    let _ = verify_challenge_ack(data, "cookie", 0);
});
