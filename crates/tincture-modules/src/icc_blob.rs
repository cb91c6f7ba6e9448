//! Data codec for ICC profiles held in memory.
//!
//! Only the fixed 128-byte header is decoded; the tag table is left to tag
//! codecs.

use std::any::Any;
use std::sync::Arc;

use tincture_core::cache::{sha256, to_hex};
use tincture_core::envelope::{Envelope, NameKind, Object, ObjectKind};
use tincture_core::registry::{CodecQuery, DataCodecApi, ScanSummary};
use tincture_core::PipelineError;

use crate::error::ModuleError;

pub const HEADER_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"acsp";
const MAGIC_OFFSET: usize = 36;

/// Profile format identifier answered by [`CodecQuery::ProfileFormat`].
pub const ICC_FORMAT: u32 = 1;
/// Interface version answered by [`CodecQuery::Compatibility`].
const INTERFACE_VERSION: i32 = 1;

fn be_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_be_bytes(word)
}

/// Render a four-character signature, e.g. `mntr`.
pub fn signature_text(sig: u32) -> String {
    sig.to_be_bytes()
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
        .collect()
}

/// A validated ICC profile.
pub struct ProfileBlob {
    envelope: Envelope,
    bytes: Arc<[u8]>,
}

impl ProfileBlob {
    pub fn parse(bytes: &[u8]) -> Result<Self, ModuleError> {
        if bytes.len() < HEADER_LEN {
            return Err(ModuleError::Truncated {
                needed: HEADER_LEN,
                found: bytes.len(),
            });
        }
        if &bytes[MAGIC_OFFSET..MAGIC_OFFSET + 4] != MAGIC {
            return Err(ModuleError::InvalidProfile("missing 'acsp' signature".into()));
        }
        let declared = be_u32(bytes, 0) as usize;
        if declared < HEADER_LEN {
            return Err(ModuleError::InvalidProfile(format!(
                "declared size {declared} is smaller than the header"
            )));
        }
        if declared > bytes.len() {
            return Err(ModuleError::Truncated {
                needed: declared,
                found: bytes.len(),
            });
        }
        Ok(Self {
            envelope: Envelope::new(ObjectKind::Profile),
            bytes: Arc::from(&bytes[..declared]),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// (major, minor) version from bytes 8 and 9.
    pub fn version(&self) -> (u8, u8) {
        (self.bytes[8], self.bytes[9] >> 4)
    }

    /// Device class, e.g. `mntr`, `prtr`, `spac`.
    pub fn class(&self) -> u32 {
        be_u32(&self.bytes, 12)
    }

    pub fn colour_space(&self) -> u32 {
        be_u32(&self.bytes, 16)
    }

    /// Profile connection space, `XYZ ` or `Lab `.
    pub fn pcs(&self) -> u32 {
        be_u32(&self.bytes, 20)
    }

    /// SHA-256 of the profile bytes, computed on first use.
    pub fn digest(&self) -> [u8; 32] {
        self.envelope.digest_or_init(|| sha256(&self.bytes))
    }

    pub fn summary(&self) -> String {
        let (major, minor) = self.version();
        format!(
            "ICC profile v{major}.{minor}, class '{}', colour space '{}', {} bytes",
            signature_text(self.class()),
            signature_text(self.colour_space()),
            self.size()
        )
    }
}

impl Clone for ProfileBlob {
    /// The copy shares the bytes, so it carries the digest over.
    fn clone(&self) -> Self {
        let envelope = self.envelope.duplicate();
        envelope.set_digest(self.digest());
        Self {
            envelope,
            bytes: Arc::clone(&self.bytes),
        }
    }
}

impl std::fmt::Debug for ProfileBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileBlob")
            .field("id", &self.envelope.id())
            .field("class", &signature_text(self.class()))
            .field("size", &self.size())
            .finish()
    }
}

impl Object for ProfileBlob {
    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn copy_object(&self) -> Option<Arc<dyn Object>> {
        Some(Arc::new(self.clone()))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

pub struct IccBlobCodec;

impl DataCodecApi for IccBlobCodec {
    fn can_handle(&self, query: CodecQuery, value: u32) -> i32 {
        match query {
            CodecQuery::Compatibility => INTERFACE_VERSION,
            CodecQuery::ProfileFormat if value == ICC_FORMAT => 1,
            _ => 0,
        }
    }

    fn load_from_memory(&self, bytes: &[u8], flags: u32) -> Result<Arc<dyn Object>, PipelineError> {
        let blob = ProfileBlob::parse(bytes)?;
        blob.envelope.set_name(NameKind::Description, blob.summary());
        let digest = blob.digest();
        tracing::debug!(
            id = blob.envelope.id(),
            digest = %to_hex(&digest),
            flags,
            "loaded ICC profile"
        );
        Ok(Arc::new(blob))
    }

    fn scan(&self, bytes: &[u8]) -> Result<ScanSummary, PipelineError> {
        let blob = ProfileBlob::parse(bytes)?;
        Ok(ScanSummary {
            summary: blob.summary(),
            source_name: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use tincture_core::envelope::downcast;

    use super::*;

    /// Minimal v4.3 display profile: a bare header plus `extra` zero bytes.
    fn sample_profile(extra: usize) -> Vec<u8> {
        let size = HEADER_LEN + extra;
        let mut bytes = vec![0u8; size];
        bytes[0..4].copy_from_slice(&(size as u32).to_be_bytes());
        bytes[8] = 4;
        bytes[9] = 0x30;
        bytes[12..16].copy_from_slice(b"mntr");
        bytes[16..20].copy_from_slice(b"RGB ");
        bytes[20..24].copy_from_slice(b"XYZ ");
        bytes[36..40].copy_from_slice(MAGIC);
        bytes
    }

    #[test]
    fn test_header_fields() {
        let blob = ProfileBlob::parse(&sample_profile(4)).expect("profile");
        assert_eq!(blob.version(), (4, 3));
        assert_eq!(signature_text(blob.class()), "mntr");
        assert_eq!(signature_text(blob.colour_space()), "RGB ");
        assert_eq!(signature_text(blob.pcs()), "XYZ ");
        assert_eq!(blob.size(), 132);
    }

    #[test]
    fn test_trailing_bytes_are_cut_at_declared_size() {
        let mut bytes = sample_profile(0);
        bytes.extend_from_slice(&[0xff; 16]);
        let blob = ProfileBlob::parse(&bytes).expect("profile");
        assert_eq!(blob.size(), HEADER_LEN);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            ProfileBlob::parse(&[0u8; 64]),
            Err(ModuleError::Truncated { needed: 128, found: 64 })
        ));

        let mut no_magic = sample_profile(0);
        no_magic[36] = b'x';
        assert!(matches!(
            ProfileBlob::parse(&no_magic),
            Err(ModuleError::InvalidProfile(_))
        ));

        let mut oversized = sample_profile(0);
        oversized[0..4].copy_from_slice(&512u32.to_be_bytes());
        assert!(matches!(
            ProfileBlob::parse(&oversized),
            Err(ModuleError::Truncated { needed: 512, .. })
        ));
    }

    #[test]
    fn test_copy_keeps_digest_and_description() {
        let loaded = IccBlobCodec
            .load_from_memory(&sample_profile(8), 0)
            .expect("load");
        let copy = loaded.copy_object().expect("copyable");
        assert_ne!(copy.envelope().id(), loaded.envelope().id());
        assert_eq!(copy.envelope().digest(), Some(sha256(&sample_profile(8))));
        assert_eq!(
            copy.envelope().name(NameKind::Description),
            loaded.envelope().name(NameKind::Description)
        );
    }

    #[test]
    fn test_codec_surface() {
        let codec = IccBlobCodec;
        assert_eq!(codec.can_handle(CodecQuery::Compatibility, 0), 1);
        assert_eq!(codec.can_handle(CodecQuery::ProfileFormat, ICC_FORMAT), 1);
        assert_eq!(codec.can_handle(CodecQuery::ProfileFormat, 2), 0);
        assert_eq!(codec.can_handle(CodecQuery::TagTypeRead, 0), 0);

        let loaded = codec.load_from_memory(&sample_profile(0), 0).expect("load");
        assert_eq!(loaded.kind(), ObjectKind::Profile);
        let blob = downcast::<ProfileBlob>(loaded).expect("profile blob");
        assert_eq!(blob.class(), u32::from_be_bytes(*b"mntr"));
        assert_eq!(blob.envelope().digest(), Some(sha256(blob.bytes())));
        assert_eq!(
            blob.envelope().name(NameKind::Description).as_deref(),
            Some("ICC profile v4.3, class 'mntr', colour space 'RGB ', 128 bytes")
        );

        let scan = codec.scan(&sample_profile(0)).expect("scan");
        assert_eq!(
            scan.summary,
            "ICC profile v4.3, class 'mntr', colour space 'RGB ', 128 bytes"
        );
        assert!(scan.source_name.is_none());
        assert!(matches!(codec.scan(b"nope"), Err(PipelineError::Codec(_))));
    }
}
