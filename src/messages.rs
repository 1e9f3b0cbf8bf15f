//! Session-level message framing (spec §4.8): the `MLSPlaintext` /
//! `MLSCiphertext` envelope that wraps a `Handshake` or application payload
//! for transmission, plus the per-message `MLSSenderData` used to identify
//! the sender of a ciphertext. Grounded in
//! `original_source/libMLS/libMLS/messages.py` and the framing calls in
//! `original_source/libMLS/libMLS/session.py`
//! (`encrypt_application_message`/`encrypt_handshake_message`).

use crate::error::Error;
use crate::handshake::{GroupOperation, Handshake};
use crate::wire::{Codec, Reader};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum ContentType {
    Invalid = 0,
    Handshake = 1,
    Application = 2,
}

impl ContentType {
    fn from_u8(v: u8) -> Result<ContentType, Error> {
        match v {
            0 => Ok(ContentType::Invalid),
            1 => Ok(ContentType::Handshake),
            2 => Ok(ContentType::Application),
            other => Err(Error::MalformedMessage(format!("unknown content type {}", other))),
        }
    }
}

/// Identifies who sent an `MLSCiphertext` and with what key generation, so the recipient knows
/// which ratcheted application/handshake key to use to open it.
#[derive(Debug)]
pub(crate) struct MLSSenderData {
    pub(crate) sender: u32,
    pub(crate) generation: u32,
}

impl Codec for MLSSenderData {
    fn encode(&self, buf: &mut Vec<u8>) {
        crate::wire::write_u32(buf, self.sender);
        crate::wire::write_u32(buf, self.generation);
    }

    fn decode(r: &mut Reader) -> Result<MLSSenderData, Error> {
        let sender = r.read_u32()?;
        let generation = r.read_u32()?;
        Ok(MLSSenderData { sender, generation })
    }
}

/// The body of an `MLSPlaintext`: either a handshake proposal or an opaque application payload.
#[derive(Debug)]
pub(crate) enum PlaintextContent {
    Handshake(Handshake),
    Application(Vec<u8>),
}

/// An unencrypted group message: a `Handshake` or application payload, tagged with the group and
/// epoch it belongs to and signed by its sender.
#[derive(Debug)]
pub(crate) struct MLSPlaintext {
    pub(crate) group_id: Vec<u8>,
    pub(crate) epoch: u32,
    pub(crate) sender: u32,
    pub(crate) content: PlaintextContent,
}

impl MLSPlaintext {
    pub(crate) fn content_type(&self) -> ContentType {
        match &self.content {
            PlaintextContent::Handshake(_) => ContentType::Handshake,
            PlaintextContent::Application(_) => ContentType::Application,
        }
    }
}

impl Codec for MLSPlaintext {
    fn encode(&self, buf: &mut Vec<u8>) {
        crate::wire::write_vec(buf, &self.group_id);
        crate::wire::write_u32(buf, self.epoch);
        crate::wire::write_u32(buf, self.sender);
        crate::wire::write_u8(buf, self.content_type() as u8);
        match &self.content {
            PlaintextContent::Handshake(h) => h.encode(buf),
            PlaintextContent::Application(data) => crate::wire::write_vec(buf, data),
        }
    }

    fn decode(r: &mut Reader) -> Result<MLSPlaintext, Error> {
        let group_id = r.read_vec()?;
        let epoch = r.read_u32()?;
        let sender = r.read_u32()?;
        let content_type = ContentType::from_u8(r.read_u8()?)?;
        let content = match content_type {
            ContentType::Handshake => PlaintextContent::Handshake(Handshake::decode(r)?),
            ContentType::Application => PlaintextContent::Application(r.read_vec()?),
            ContentType::Invalid => return Err(Error::MalformedMessage("invalid content type".into())),
        };
        Ok(MLSPlaintext {
            group_id,
            epoch,
            sender,
            content,
        })
    }
}

impl crate::wire::Message for MLSPlaintext {
    fn validate(&self) -> bool {
        self.group_id.len() < 256
    }
}

/// An encrypted group message on the wire: everything but the outer framing is opaque, so
/// `group_id`/`epoch`/`content_type` must be checked against the decrypted `MLSPlaintext` before
/// the plaintext is trusted (`verify_metadata`).
#[derive(Debug)]
pub struct MLSCiphertext {
    pub(crate) group_id: Vec<u8>,
    pub(crate) epoch: u32,
    pub(crate) content_type: ContentType,
    pub(crate) sender_data_nonce: Vec<u8>,
    pub(crate) encrypted_sender_data: Vec<u8>,
    pub(crate) ciphertext: Vec<u8>,
}

impl MLSCiphertext {
    /// Confirms a decrypted `MLSPlaintext` actually belongs to this ciphertext's framing, instead
    /// of trusting the plaintext's self-reported metadata outright.
    pub(crate) fn verify_metadata(&self, plaintext: &MLSPlaintext) -> bool {
        self.group_id == plaintext.group_id
            && self.epoch == plaintext.epoch
            && self.content_type == plaintext.content_type()
    }
}

impl Codec for MLSCiphertext {
    fn encode(&self, buf: &mut Vec<u8>) {
        crate::wire::write_vec(buf, &self.group_id);
        crate::wire::write_u32(buf, self.epoch);
        crate::wire::write_u8(buf, self.content_type as u8);
        crate::wire::write_vec(buf, &self.sender_data_nonce);
        crate::wire::write_vec(buf, &self.encrypted_sender_data);
        crate::wire::write_vec(buf, &self.ciphertext);
    }

    fn decode(r: &mut Reader) -> Result<MLSCiphertext, Error> {
        let group_id = r.read_vec()?;
        let epoch = r.read_u32()?;
        let content_type = ContentType::from_u8(r.read_u8()?)?;
        let sender_data_nonce = r.read_vec()?;
        let encrypted_sender_data = r.read_vec()?;
        let ciphertext = r.read_vec()?;
        Ok(MLSCiphertext {
            group_id,
            epoch,
            content_type,
            sender_data_nonce,
            encrypted_sender_data,
            ciphertext,
        })
    }
}

impl crate::wire::Message for MLSCiphertext {}

/// Wraps a `GroupOperation` as a signed, confirmed `Handshake` ready to be framed into an
/// `MLSPlaintext`.
pub(crate) fn handshake_plaintext(
    cs: &'static crate::crypto::ciphersuite::CipherSuite,
    state: &crate::group_state::GroupState,
    sender: u32,
    op: GroupOperation,
) -> MLSPlaintext {
    let handshake = Handshake::from_group_op(cs, state, op);
    MLSPlaintext {
        group_id: state.context.group_id.clone(),
        epoch: state.epoch,
        sender,
        content: PlaintextContent::Handshake(handshake),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::Message;

    #[test]
    fn application_plaintext_round_trips() {
        let plaintext = MLSPlaintext {
            group_id: b"group".to_vec(),
            epoch: 3,
            sender: 1,
            content: PlaintextContent::Application(b"hello".to_vec()),
        };
        let packed = plaintext.pack().unwrap();
        let decoded = MLSPlaintext::from_bytes(&packed).unwrap();
        assert_eq!(decoded.epoch, 3);
        assert!(matches!(decoded.content, PlaintextContent::Application(ref d) if d == b"hello"));
    }

    #[test]
    fn ciphertext_metadata_must_match_plaintext() {
        let plaintext = MLSPlaintext {
            group_id: b"group".to_vec(),
            epoch: 3,
            sender: 1,
            content: PlaintextContent::Application(b"hello".to_vec()),
        };
        let matching = MLSCiphertext {
            group_id: b"group".to_vec(),
            epoch: 3,
            content_type: ContentType::Application,
            sender_data_nonce: vec![],
            encrypted_sender_data: vec![],
            ciphertext: vec![],
        };
        let mismatched = MLSCiphertext {
            epoch: 4,
            ..matching_clone(&matching)
        };
        assert!(matching.verify_metadata(&plaintext));
        assert!(!mismatched.verify_metadata(&plaintext));
    }

    fn matching_clone(c: &MLSCiphertext) -> MLSCiphertext {
        MLSCiphertext {
            group_id: c.group_id.clone(),
            epoch: c.epoch,
            content_type: c.content_type,
            sender_data_nonce: c.sender_data_nonce.clone(),
            encrypted_sender_data: c.encrypted_sender_data.clone(),
            ciphertext: c.ciphertext.clone(),
        }
    }
}
