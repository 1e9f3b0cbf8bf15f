use crate::error::Error;
use crate::wire::{Codec, Reader};

/// Identity information bound to a tree node or a `UserInitKey`.
///
/// The core never interprets this beyond treating it as opaque bytes — a
/// concrete deployment would define its own credential format (X.509, a
/// raw public key, etc). See spec Non-goals: authentication of servers and
/// signature/MAC validation are explicitly out of scope; this type exists so
/// the wire format has somewhere to carry identity, not to validate it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
    pub identity: Vec<u8>,
}

impl Credential {
    pub fn new(identity: Vec<u8>) -> Credential {
        Credential { identity }
    }
}

impl Codec for Credential {
    fn encode(&self, buf: &mut Vec<u8>) {
        crate::wire::write_vec(buf, &self.identity);
    }

    fn decode(r: &mut Reader) -> Result<Credential, Error> {
        Ok(Credential {
            identity: r.read_vec()?,
        })
    }
}
