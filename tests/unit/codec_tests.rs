use bytes::BytesMut;
use server_warden::supervisor::codec::{OutputLineCodec, MAX_LINE_BYTES};
use tokio_util::codec::Decoder;

fn decode_all(input: &[u8]) -> Vec<String> {
    let mut codec = OutputLineCodec::new();
    let mut buf = BytesMut::from(input);
    let mut lines = Vec::new();

    while let Ok(Some(line)) = codec.decode(&mut buf) {
        lines.push(line);
    }
    while let Ok(Some(line)) = codec.decode_eof(&mut buf) {
        lines.push(line);
    }
    lines
}

#[test]
fn splits_on_newlines() {
    let lines = decode_all(b"ready on port 3000\ncompiled ok\n");
    assert_eq!(lines, vec!["ready on port 3000", "compiled ok"]);
}

#[test]
fn strips_carriage_returns() {
    let lines = decode_all(b"windows line\r\nunix line\n");
    assert_eq!(lines, vec!["windows line", "unix line"]);
}

#[test]
fn partial_line_waits_for_newline() {
    let mut codec = OutputLineCodec::new();
    let mut buf = BytesMut::from(&b"no newline yet"[..]);

    assert!(codec.decode(&mut buf).expect("decode ok").is_none());

    buf.extend_from_slice(b" and now\n");
    let line = codec.decode(&mut buf).expect("decode ok").expect("line");
    assert_eq!(line, "no newline yet and now");
}

#[test]
fn flushes_trailing_bytes_at_eof() {
    let lines = decode_all(b"complete\nleftover without newline");
    assert_eq!(lines, vec!["complete", "leftover without newline"]);
}

#[test]
fn invalid_utf8_is_decoded_lossily() {
    // 0xFF is never valid UTF-8; draining must not fail on it.
    let lines = decode_all(b"ok \xff\xfe bytes\n");
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("ok "));
    assert!(lines[0].contains('\u{FFFD}'));
}

#[test]
fn overlong_line_is_flushed_in_chunks() {
    let mut input = vec![b'x'; MAX_LINE_BYTES + 10];
    input.push(b'\n');

    let lines = decode_all(&input);
    assert_eq!(lines.len(), 2, "one max-size chunk plus the remainder");
    assert_eq!(lines[0].len(), MAX_LINE_BYTES);
    assert_eq!(lines[1].len(), 10);
}

#[test]
fn overlong_chunk_keeps_mid_data_carriage_return() {
    // The chunk boundary lands right after a \r that is part of the data,
    // not a CRLF line ending; it must survive.
    let mut input = vec![b'x'; MAX_LINE_BYTES - 1];
    input.push(b'\r');
    input.extend_from_slice(b"more\r\n");

    let lines = decode_all(&input);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].len(), MAX_LINE_BYTES);
    assert!(lines[0].ends_with('\r'));
    assert_eq!(lines[1], "more");
}

#[test]
fn eof_remainder_keeps_trailing_carriage_return() {
    // Not newline-terminated, so the \r cannot be a CRLF line ending.
    let lines = decode_all(b"tail\r");
    assert_eq!(lines, vec!["tail\r"]);
}

#[test]
fn empty_input_yields_nothing() {
    assert!(decode_all(b"").is_empty());
}

#[test]
fn blank_lines_are_kept() {
    let lines = decode_all(b"\n\n");
    assert_eq!(lines, vec!["", ""]);
}
