#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use refbox_comm::{Frame, FrameCodec};
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // datagram path: must never panic on arbitrary bytes
    let _ = Frame::from_datagram(data);

    // stream path with a small limit so large declared sizes are refused early
    let mut codec = FrameCodec::new(64 * 1024);
    let mut buf = BytesMut::from(data);
    while let Ok(Some(_)) = codec.decode(&mut buf) {}
});
