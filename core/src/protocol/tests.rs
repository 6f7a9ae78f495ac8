//! Frame parsing, serialization and stream splitting tests.

#[cfg(test)]
mod tests {
    use crate::protocol::*;
    use bytes::{Bytes, BytesMut};
    use tokio_util::codec::{Decoder, Encoder};

    fn parse(raw: &'static [u8]) -> Result<Frame, FrameError> {
        Frame::parse(Bytes::from_static(raw), DEFAULT_MAX_HEADER_LENGTH)
    }

    #[test]
    fn test_parse_connect_frame() {
        let frame = parse(b"CONNECT\nlogin:u\npasscode:p\n\n").expect("parse");

        assert_eq!(frame.command, "CONNECT");
        assert_eq!(frame.header("login"), Some("u"));
        assert_eq!(frame.header("passcode"), Some("p"));
        assert!(frame.body.is_empty());
    }

    #[test]
    fn test_parse_crlf_line_endings() {
        let frame = parse(b"SEND\r\ndestination:/queue/a\r\n\r\nhello").expect("parse");

        assert_eq!(frame.command, "SEND");
        assert_eq!(frame.header("destination"), Some("/queue/a"));
        assert_eq!(frame.body, Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_parse_skips_leading_newlines() {
        let frame = parse(b"\r\n\nSUBSCRIBE\ndestination:/queue/a\n\n").expect("parse");
        assert_eq!(frame.command, "SUBSCRIBE");
    }

    #[test]
    fn test_parse_strips_whitespace_after_colon() {
        let frame = parse(b"SEND\ndestination: \t/queue/a\n\n").expect("parse");
        assert_eq!(frame.header("destination"), Some("/queue/a"));
    }

    #[test]
    fn test_parse_keeps_colons_in_value() {
        let frame = parse(b"SEND\nreply-to:tcp://host:61613\n\n").expect("parse");
        assert_eq!(frame.header("reply-to"), Some("tcp://host:61613"));
    }

    #[test]
    fn test_parse_ignores_lines_without_colon() {
        let frame = parse(b"SEND\ngarbage\ndestination:/queue/a\n\n").expect("parse");

        assert_eq!(frame.headers.len(), 1);
        assert_eq!(frame.header("destination"), Some("/queue/a"));
    }

    #[test]
    fn test_parse_duplicate_header_first_wins() {
        let frame = parse(b"SEND\ndestination:/queue/first\ndestination:/queue/second\n\n")
            .expect("parse");

        assert_eq!(frame.headers.len(), 1);
        assert_eq!(frame.header("destination"), Some("/queue/first"));
    }

    #[test]
    fn test_parse_body_keeps_blank_lines() {
        let frame = parse(b"SEND\ndestination:/queue/a\n\nline one\n\nline two\n").expect("parse");
        assert_eq!(frame.body, Bytes::from_static(b"line one\n\nline two\n"));
    }

    #[test]
    fn test_parse_without_blank_line_has_empty_body() {
        let frame = parse(b"DISCONNECT\nreceipt:77").expect("parse");

        assert_eq!(frame.command, "DISCONNECT");
        assert_eq!(frame.header("receipt"), Some("77"));
        assert!(frame.body.is_empty());
    }

    #[test]
    fn test_parse_rejects_oversized_header_line() {
        let mut raw = b"SEND\ndestination:".to_vec();
        raw.extend(std::iter::repeat(b'x').take(64));
        raw.extend_from_slice(b"\n\nbody");

        let err = Frame::parse(Bytes::from(raw), 32).expect_err("oversized header");
        assert!(matches!(err, FrameError::HeaderTooLong { max: 32, .. }));
    }

    #[test]
    fn test_parse_body_is_not_subject_to_header_limit() {
        let mut raw = b"SEND\ndestination:/q\n\n".to_vec();
        raw.extend(std::iter::repeat(b'x').take(4096));

        let frame = Frame::parse(Bytes::from(raw), 32).expect("parse");
        assert_eq!(frame.body.len(), 4096);
    }

    #[test]
    fn test_parse_rejects_empty_frame() {
        assert!(matches!(parse(b"\n\n"), Err(FrameError::MissingCommand)));
        assert!(matches!(parse(b""), Err(FrameError::MissingCommand)));
    }

    #[test]
    fn test_encode_layout() {
        let frame = Frame::new(Command::Connected).with_header(SESSION_HEADER, "0");
        assert_eq!(&frame.to_bytes()[..], b"CONNECTED\nsession:0\n\n\0");
    }

    #[test]
    fn test_encode_skips_receipt_header() {
        let frame = Frame::new(Command::Message)
            .with_header(DESTINATION_HEADER, "/queue/x")
            .with_header(RECEIPT_HEADER, "r-1")
            .with_body("hello");

        assert_eq!(
            &frame.to_bytes()[..],
            b"MESSAGE\ndestination:/queue/x\n\nhello\0"
        );
    }

    #[test]
    fn test_encode_receipt_frame_keeps_receipt_header() {
        let frame = Frame::new(Command::Receipt).with_header(RECEIPT_HEADER, "r-1");
        assert_eq!(&frame.to_bytes()[..], b"RECEIPT\nreceipt:r-1\n\n\0");
    }

    #[test]
    fn test_encode_then_parse_preserves_header_order() {
        let frame = Frame::new(Command::Send)
            .with_header("destination", "/queue/a")
            .with_header("content-type", "text/plain")
            .with_header("x-trace", "abc")
            .with_body("payload");

        let wire = frame.to_bytes();
        let decoded =
            Frame::parse(wire.slice(..wire.len() - 1), DEFAULT_MAX_HEADER_LENGTH).expect("parse");

        let names: Vec<&str> = decoded.headers.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["destination", "content-type", "x-trace"]);
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_headers_insert_reports_duplicates() {
        let mut headers = Headers::new();
        assert!(headers.insert("a", "1"));
        assert!(!headers.insert("a", "2"));
        assert_eq!(headers.get("a"), Some("1"));
        assert_eq!(headers.remove("a"), Some("1".to_string()));
        assert!(headers.is_empty());
    }

    #[test]
    fn test_codec_waits_for_terminator() {
        let mut codec = StompFrameCodec::default();
        let mut buf = BytesMut::from(&b"SEND\ndestination:/q\n\nhel"[..]);

        assert!(codec.decode(&mut buf).expect("decode").is_none());

        buf.extend_from_slice(b"lo\0CONN");
        let raw = codec.decode(&mut buf).expect("decode").expect("frame");
        assert_eq!(&raw[..], b"SEND\ndestination:/q\n\nhello");
        assert_eq!(&buf[..], b"CONN");
    }

    #[test]
    fn test_codec_splits_back_to_back_frames() {
        let mut codec = StompFrameCodec::default();
        let mut buf = BytesMut::from(&b"CONNECT\n\n\0\nSEND\ndestination:/q\n\nx\0"[..]);

        let first = codec.decode(&mut buf).expect("decode").expect("first");
        let second = codec.decode(&mut buf).expect("decode").expect("second");

        assert_eq!(&first[..], b"CONNECT\n\n");
        let second = Frame::parse(second, DEFAULT_MAX_HEADER_LENGTH).expect("parse");
        assert_eq!(second.command, "SEND");
        assert_eq!(second.body, Bytes::from_static(b"x"));
        assert!(codec.decode(&mut buf).expect("decode").is_none());
    }

    #[test]
    fn test_codec_rejects_unterminated_oversized_frame() {
        let mut codec = StompFrameCodec::new(16);
        let mut buf = BytesMut::from(&[b'A'; 32][..]);

        let err = codec.decode(&mut buf).expect_err("too large");
        assert!(matches!(err, FrameError::FrameTooLarge { max: 16, .. }));
    }

    #[test]
    fn test_codec_eof_drops_partial_frame() {
        let mut codec = StompFrameCodec::default();
        let mut buf = BytesMut::from(&b"SEND\ndesti"[..]);

        assert!(codec.decode_eof(&mut buf).expect("eof").is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_encode_appends_terminator() {
        let mut codec = StompFrameCodec::default();
        let mut buf = BytesMut::new();
        let frame = Frame::new(Command::Error).with_header(MESSAGE_HEADER, "Unknown command");

        codec.encode(frame, &mut buf).expect("encode");
        assert_eq!(&buf[..], b"ERROR\nmessage:Unknown command\n\n\0");
    }
}
