use bytes::BytesMut;
use ledgerwatch_overlay::{
    compression, Algorithm, Message, MessageCodec, MessageHeader, MessageType, OverlayError,
    HEADER_SIZE,
};
use tokio_util::codec::{Decoder, Encoder};

#[test]
fn test_known_uncompressed_header() {
    // 300-byte PING payload.
    let header = MessageHeader::parse(&hex::decode("0000012c0003").expect("hex"))
        .expect("valid")
        .expect("complete");
    assert!(!header.compressed);
    assert_eq!(header.algorithm, Algorithm::None);
    assert_eq!(header.payload_wire_size, 300);
    assert_eq!(header.message_type, MessageType::Ping);
    assert_eq!(header.total_wire_size(), 306);
}

#[test]
fn test_codec_mixed_stream() {
    let big = b"get objects ".repeat(100);
    let messages = vec![
        Message::new(MessageType::GetObjects, &big, true).expect("message"),
        Message::new(MessageType::Validation, &big, true).expect("message"),
        Message::new(MessageType::Other(77), b"short", true).expect("message"),
    ];

    let mut sender = MessageCodec::new(true);
    let mut wire = BytesMut::new();
    for msg in &messages {
        sender.encode(msg, &mut wire).expect("encode");
    }

    let mut receiver = MessageCodec::new(false);
    let mut decoded = Vec::new();
    while let Some(frame) = receiver.decode(&mut wire).expect("decode") {
        decoded.push(frame);
    }

    assert_eq!(decoded.len(), 3);
    assert!(decoded[0].header.compressed);
    assert!(!decoded[1].header.compressed);
    assert_eq!(decoded[0].payload, big);
    assert_eq!(decoded[1].payload, big);
    assert_eq!(decoded[2].payload, b"short");
    assert_eq!(decoded[2].header.message_type, MessageType::Other(77));
}

#[test]
fn test_corrupt_compressed_payload() {
    let mut frame = vec![0u8; HEADER_SIZE];
    let body = b"\x50garbage that is not lz4";
    let header = MessageHeader {
        compressed: true,
        algorithm: Algorithm::Lz4,
        payload_wire_size: body.len() as u32,
        message_type: MessageType::LedgerData,
    };
    frame[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    frame.extend_from_slice(body);

    let mut codec = MessageCodec::default();
    let mut src = BytesMut::from(&frame[..]);
    let err = codec.decode(&mut src).expect_err("corrupt frame");
    assert!(matches!(err, OverlayError::Compression(_)));
    assert!(!err.is_fatal());
    // The bad frame was consumed; the stream stays usable.
    assert!(src.is_empty());
}

#[test]
fn test_compressed_payload_format() {
    let payload = vec![0u8; 5000];
    let msg = Message::new(MessageType::LedgerData, &payload, true).expect("message");
    let wire = msg.buffer(true);
    let body = &wire[HEADER_SIZE..];

    // 5000 needs a 2-byte size prefix.
    assert_eq!(body[0] >> 6, 0b10);
    assert_eq!(compression::read_size(body).expect("prefix"), (5000, 2));
    assert_eq!(
        compression::decompress(body, payload.len()).expect("decompress"),
        payload
    );
}
