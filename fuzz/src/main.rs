//! AFL harness feeding arbitrary bytes through the multipart reader.
//!
//! The first input byte picks the read size so the fuzzer also explores how
//! boundaries split across transport reads. Framing errors are expected;
//! panics and accounting drift are not.

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use twainlink::multipart::{Boundary, FrameError, MultipartFrameReader};

const BUFFER_LIMIT: usize = 64 * 1024;

fn drive(data: &[u8]) -> Result<(), FrameError> {
    let Some((&width, body)) = data.split_first() else {
        return Ok(());
    };
    let declared = u64::try_from(body.len()).unwrap_or(u64::MAX);
    let mut reader = MultipartFrameReader::new(Boundary::default(), Some(declared))
        .with_buffer_limit(BUFFER_LIMIT);
    let mut buf = BytesMut::new();
    for piece in body.chunks(usize::from(width).max(1)) {
        reader.note_read(piece.len())?;
        buf.extend_from_slice(piece);
        while reader.decode(&mut buf)?.is_some() {}
    }
    while reader.decode_eof(&mut buf)?.is_some() {}
    assert_eq!(reader.tally().processed(), reader.tally().read());
    Ok(())
}

fn main() {
    afl::fuzz!(|data: &[u8]| {
        if let Err(e) = drive(data) {
            // Every rejection must map onto a stable wire code.
            assert!(!e.code().is_empty());
        }
    });
}
