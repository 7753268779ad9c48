//! Framing a reply with the writer and reading it back with the reader.
//!
//! The writer streams images in small chunks here so that image sizes of a
//! few chunk widths exercise every trailer placement, and the reader is fed
//! the same stream in 1-byte, 17-byte and whole-stream reads.

use std::path::Path;

use bytes::{Bytes, BytesMut};
use futures_util::stream;
use proptest::prelude::*;
use rstest::rstest;
use tempfile::TempDir;
use test_util::AnyError;
use tokio_util::codec::Decoder;
use twainlink::{
    multipart::{
        Attachments,
        Boundary,
        FrameEvent,
        MultipartFrameReader,
        MultipartFrameWriter,
        OutputFiles,
        SectionKind,
        read_multipart,
    },
    tally::TransferTally,
};

const WRITER_CHUNK: usize = 64;
const JSON: &str = r#"{"kind":"twainlist","results":{"success":true}}"#;

fn pattern(len: usize) -> Vec<u8> {
    (0..=250u8).cycle().take(len).collect()
}

async fn frame(
    dir: &Path,
    json: &str,
    thumbnail: Option<&[u8]>,
    image: &[u8],
) -> Result<(Vec<u8>, u64), AnyError> {
    let mut attachments = Attachments::none();
    if let Some(data) = thumbnail {
        let path = dir.join("thumb-in.pdf");
        tokio::fs::write(&path, data).await?;
        attachments = attachments.with_thumbnail(path);
    }
    let image_path = dir.join("image-in.pdf");
    tokio::fs::write(&image_path, image).await?;
    let writer = MultipartFrameWriter::new(Boundary::default()).with_chunk_size(WRITER_CHUNK);
    let reply = writer.prepare(json, &attachments.with_image(image_path)).await?;
    let mut out = Vec::new();
    writer.write_body(&reply, &mut out).await?;
    Ok((out, reply.content_length()))
}

struct Parsed {
    json: String,
    image: Vec<u8>,
    thumbnail: Option<Vec<u8>>,
    tally: TransferTally,
}

async fn parse(dir: &Path, body: &[u8], read: usize) -> Result<Parsed, AnyError> {
    let image_out = dir.join(format!("image-out-{read}.pdf"));
    let thumbnail_out = dir.join(format!("thumb-out-{read}.pdf"));
    let outputs = OutputFiles::new()
        .with_image(&image_out)
        .with_thumbnail(&thumbnail_out);
    let declared = u64::try_from(body.len())?;
    let chunks: Vec<Result<Bytes, std::io::Error>> = body
        .chunks(read.max(1))
        .map(|piece| Ok(Bytes::copy_from_slice(piece)))
        .collect();
    let mut reader = MultipartFrameReader::new(Boundary::default(), Some(declared));
    let payload = read_multipart(&mut reader, stream::iter(chunks), &outputs).await?;
    let thumbnail = if payload
        .files
        .iter()
        .any(|(kind, _)| *kind == SectionKind::Thumbnail)
    {
        Some(tokio::fs::read(&thumbnail_out).await?)
    } else {
        None
    };
    Ok(Parsed {
        json: payload.json,
        image: tokio::fs::read(&image_out).await?,
        thumbnail,
        tally: reader.into_tally(),
    })
}

#[rstest]
#[case::empty(0)]
#[case::one_byte(1)]
#[case::short_of_a_chunk(WRITER_CHUNK - 1)]
#[case::exactly_one_chunk(WRITER_CHUNK)]
#[case::trailer_inline(WRITER_CHUNK - 4)]
#[case::trailer_spills(WRITER_CHUNK - 2)]
#[case::one_past(WRITER_CHUNK + 1)]
#[case::several_chunks(WRITER_CHUNK * 5 + 7)]
#[case::many_chunks(WRITER_CHUNK * 40)]
#[tokio::test]
async fn image_survives_the_round_trip(#[case] size: usize) -> Result<(), AnyError> {
    let dir = TempDir::new()?;
    let image = pattern(size);
    let (body, content_length) = frame(dir.path(), JSON, None, &image).await?;
    assert_eq!(u64::try_from(body.len())?, content_length);

    let reads: &[usize] = if size <= 512 {
        &[1, 17, usize::MAX]
    } else {
        &[17, usize::MAX]
    };
    for &read in reads {
        let parsed = parse(dir.path(), &body, read).await?;
        assert_eq!(parsed.json, JSON, "read size {read}");
        assert_eq!(parsed.image, image, "read size {read}");
        assert!(parsed.thumbnail.is_none());
        assert_eq!(parsed.tally.processed(), parsed.tally.read());
        assert_eq!(parsed.tally.read(), content_length);
        let section = parsed
            .tally
            .section(SectionKind::Image)
            .ok_or_else(|| anyhow::anyhow!("image section missing"))?;
        assert_eq!(section.declared(), u64::try_from(size)?);
        assert!(section.is_complete());
    }
    Ok(())
}

#[rstest]
#[tokio::test]
async fn thumbnail_and_image_arrive_in_order() -> Result<(), AnyError> {
    let dir = TempDir::new()?;
    let thumbnail = pattern(90);
    let image = pattern(333);
    let (body, _) = frame(dir.path(), JSON, Some(&thumbnail), &image).await?;

    let parsed = parse(dir.path(), &body, 17).await?;
    assert_eq!(parsed.thumbnail.as_deref(), Some(thumbnail.as_slice()));
    assert_eq!(parsed.image, image);
    let kinds: Vec<_> = parsed
        .tally
        .sections()
        .iter()
        .map(twainlink::tally::SectionTally::kind)
        .collect();
    assert_eq!(
        kinds,
        [SectionKind::Json, SectionKind::Thumbnail, SectionKind::Image]
    );
    Ok(())
}

#[rstest]
#[tokio::test]
async fn declared_never_exceeded_while_reading() -> Result<(), AnyError> {
    let dir = TempDir::new()?;
    let (body, content_length) = frame(dir.path(), JSON, None, &pattern(700)).await?;
    let mut reader = MultipartFrameReader::new(Boundary::default(), Some(content_length));
    let mut buf = BytesMut::new();
    let mut last = None;
    for piece in body.chunks(13) {
        reader.note_read(piece.len())?;
        buf.extend_from_slice(piece);
        while let Some(event) = reader.decode(&mut buf)? {
            assert!(reader.tally().processed() <= content_length);
            last = Some(event);
        }
        assert!(reader.tally().processed() <= reader.tally().read());
    }
    while let Some(event) = reader.decode_eof(&mut buf)? {
        last = Some(event);
    }
    assert_eq!(last, Some(FrameEvent::Finished));
    assert_eq!(reader.tally().processed(), reader.tally().read());
    Ok(())
}

fn decode_all(body: &[u8], read: usize) -> Vec<FrameEvent> {
    let declared = u64::try_from(body.len()).unwrap_or(u64::MAX);
    let mut reader = MultipartFrameReader::new(Boundary::default(), Some(declared));
    let mut buf = BytesMut::new();
    let mut events = Vec::new();
    for piece in body.chunks(read) {
        reader.note_read(piece.len()).expect("within declared length");
        buf.extend_from_slice(piece);
        while let Some(event) = reader.decode(&mut buf).expect("decode") {
            events.push(event);
        }
    }
    while let Some(event) = reader.decode_eof(&mut buf).expect("decode at eof") {
        events.push(event);
    }
    events
}

fn coalesce(events: Vec<FrameEvent>) -> (Option<String>, Vec<u8>) {
    let mut json = None;
    let mut image = Vec::new();
    for event in events {
        match event {
            FrameEvent::Json(text) => json = Some(text),
            FrameEvent::Binary { chunk, .. } => image.extend_from_slice(&chunk),
            FrameEvent::SectionComplete(_) | FrameEvent::Finished => {}
        }
    }
    (json, image)
}

proptest! {
    /// Any read size yields the same JSON and image bytes.
    #[test]
    fn read_size_does_not_change_the_result(
        image in proptest::collection::vec(any::<u8>(), 0..600),
        read in 1usize..200,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let dir = TempDir::new().expect("tempdir");
        let (body, _) = runtime
            .block_on(frame(dir.path(), JSON, None, &image))
            .expect("frame");

        let (json, parsed) = coalesce(decode_all(&body, read));
        prop_assert_eq!(json.as_deref(), Some(JSON));
        prop_assert_eq!(parsed, image);
    }
}
