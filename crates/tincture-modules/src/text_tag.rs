//! Tag codec for the `text` and `sig ` tag types.
//!
//! Both types start with the four-byte type signature followed by four
//! reserved zero bytes. `text` then holds 7-bit ASCII up to a NUL terminator;
//! `sig ` holds a single four-byte signature.

use tincture_core::registry::{CodecQuery, TagBlock, TagCodecApi, TagRecord};
use tincture_core::PipelineError;

use crate::error::ModuleError;

pub const TEXT_TYPE: u32 = u32::from_be_bytes(*b"text");
pub const SIGNATURE_TYPE: u32 = u32::from_be_bytes(*b"sig ");

const PREAMBLE_LEN: usize = 8;
const INTERFACE_VERSION: i32 = 1;

fn supported(tag_type: u32) -> bool {
    matches!(tag_type, TEXT_TYPE | SIGNATURE_TYPE)
}

fn body(tag: &TagBlock) -> Result<(u32, &[u8]), ModuleError> {
    let found = tag.data.len();
    let tag_type = tag.tag_type().ok_or(ModuleError::Truncated {
        needed: PREAMBLE_LEN,
        found,
    })?;
    if found < PREAMBLE_LEN {
        return Err(ModuleError::Truncated {
            needed: PREAMBLE_LEN,
            found,
        });
    }
    Ok((tag_type, &tag.data[PREAMBLE_LEN..]))
}

fn decode(tag: &TagBlock) -> Result<Vec<TagRecord>, ModuleError> {
    let (tag_type, payload) = body(tag)?;
    match tag_type {
        TEXT_TYPE => {
            let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
            let text = &payload[..end];
            if !text.is_ascii() {
                return Err(ModuleError::InvalidProfile(
                    "text tag holds non-ASCII bytes".into(),
                ));
            }
            Ok(vec![TagRecord::Text(String::from_utf8_lossy(text).into_owned())])
        }
        SIGNATURE_TYPE => {
            let word: [u8; 4] = payload
                .get(..4)
                .and_then(|b| b.try_into().ok())
                .ok_or(ModuleError::Truncated {
                    needed: PREAMBLE_LEN + 4,
                    found: tag.data.len(),
                })?;
            Ok(vec![TagRecord::Signature(u32::from_be_bytes(word))])
        }
        other => Err(ModuleError::UnsupportedTagType(other)),
    }
}

fn encode(tag_type: u32, records: &[TagRecord]) -> Result<Vec<u8>, ModuleError> {
    let mismatch = ModuleError::RecordMismatch {
        tag_type,
        records: records.len(),
    };
    let mut out = Vec::with_capacity(PREAMBLE_LEN + 4);
    out.extend_from_slice(&tag_type.to_be_bytes());
    out.extend_from_slice(&[0; 4]);
    match (tag_type, records) {
        (TEXT_TYPE, [TagRecord::Text(text)]) => {
            if !text.is_ascii() || text.contains('\0') {
                return Err(mismatch);
            }
            out.extend_from_slice(text.as_bytes());
            out.push(0);
        }
        (SIGNATURE_TYPE, [TagRecord::Signature(sig)]) => {
            out.extend_from_slice(&sig.to_be_bytes());
        }
        (TEXT_TYPE | SIGNATURE_TYPE, _) => return Err(mismatch),
        (other, _) => return Err(ModuleError::UnsupportedTagType(other)),
    }
    Ok(out)
}

pub struct TextTagCodec;

impl TagCodecApi for TextTagCodec {
    fn can_handle(&self, query: CodecQuery, value: u32) -> i32 {
        match query {
            CodecQuery::Compatibility => INTERFACE_VERSION,
            CodecQuery::TagTypeRead | CodecQuery::TagTypeWrite => i32::from(supported(value)),
            CodecQuery::ProfileFormat => 0,
        }
    }

    fn get_values(&self, tag: &TagBlock) -> Result<Vec<TagRecord>, PipelineError> {
        let records = decode(tag)?;
        tracing::trace!(
            signature = tag.signature,
            records = records.len(),
            "decoded tag"
        );
        Ok(records)
    }

    fn create(&self, tag_type: u32, records: &[TagRecord]) -> Result<Vec<u8>, PipelineError> {
        Ok(encode(tag_type, records)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESC: u32 = u32::from_be_bytes(*b"desc");

    fn block(data: &[u8]) -> TagBlock {
        TagBlock {
            signature: DESC,
            data: data.to_vec(),
        }
    }

    #[test]
    fn test_reads_text_up_to_terminator() {
        let mut data = b"text\0\0\0\0sRGB display".to_vec();
        data.extend_from_slice(b"\0garbage");
        let records = TextTagCodec.get_values(&block(&data)).expect("text");
        assert_eq!(records, vec![TagRecord::Text("sRGB display".into())]);
    }

    #[test]
    fn test_reads_signature() {
        let records = TextTagCodec
            .get_values(&block(b"sig \0\0\0\0CRT "))
            .expect("sig");
        assert_eq!(
            records,
            vec![TagRecord::Signature(u32::from_be_bytes(*b"CRT "))]
        );
    }

    #[test]
    fn test_create_then_read() {
        let bytes = TextTagCodec
            .create(TEXT_TYPE, &[TagRecord::Text("Copyright".into())])
            .expect("create");
        assert_eq!(&bytes[..8], b"text\0\0\0\0");
        assert_eq!(bytes.last(), Some(&0));
        assert_eq!(
            TextTagCodec.get_values(&block(&bytes)).expect("read back"),
            vec![TagRecord::Text("Copyright".into())]
        );
    }

    #[test]
    fn test_rejections() {
        assert!(matches!(
            TextTagCodec.get_values(&block(b"sig \0\0")),
            Err(PipelineError::Codec(_))
        ));
        assert!(TextTagCodec.get_values(&block(b"sig \0\0\0\0AB")).is_err());
        assert!(TextTagCodec.get_values(&block(b"curv\0\0\0\0\0\0\0\0")).is_err());
        assert!(TextTagCodec
            .create(SIGNATURE_TYPE, &[TagRecord::Text("x".into())])
            .is_err());
        assert!(TextTagCodec.create(TEXT_TYPE, &[]).is_err());
        assert!(TextTagCodec
            .create(TEXT_TYPE, &[TagRecord::Text("café".into())])
            .is_err());
    }

    #[test]
    fn test_can_handle() {
        assert_eq!(TextTagCodec.can_handle(CodecQuery::TagTypeRead, TEXT_TYPE), 1);
        assert_eq!(TextTagCodec.can_handle(CodecQuery::TagTypeWrite, SIGNATURE_TYPE), 1);
        assert_eq!(
            TextTagCodec.can_handle(CodecQuery::TagTypeRead, u32::from_be_bytes(*b"curv")),
            0
        );
        assert_eq!(TextTagCodec.can_handle(CodecQuery::ProfileFormat, 1), 0);
    }
}
