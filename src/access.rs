//! Access-layer identifiers: model identities and the 16-bit opcodes carried
//! at the front of model payloads.
use crate::mesh::{CompanyId, ModelId};
use core::fmt::{self, Display, Formatter};

/// Identity of a model within an element. SIG models have no `CompanyId`
/// (the "no vendor" sentinel); vendor models carry one and are reported to
/// the management service in a separate list.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, serde::Serialize, serde::Deserialize,
)]
pub struct ModelIdentifier {
    model_id: ModelId,
    company_id: Option<CompanyId>,
}
impl ModelIdentifier {
    #[must_use]
    pub const fn new_sig(model_id: ModelId) -> ModelIdentifier {
        ModelIdentifier {
            model_id,
            company_id: None,
        }
    }
    /// Creates a vendor model identity from a `ModelId` and a `CompanyId`.
    #[must_use]
    pub const fn new_vendor(model_id: ModelId, company_id: CompanyId) -> ModelIdentifier {
        ModelIdentifier {
            model_id,
            company_id: Some(company_id),
        }
    }
    #[must_use]
    pub const fn model_id(&self) -> ModelId {
        self.model_id
    }
    /// Returns the `CompanyId` of a vendor model or `None` for a SIG model.
    #[must_use]
    pub const fn company_id(&self) -> Option<CompanyId> {
        self.company_id
    }
    #[must_use]
    pub const fn is_sig(&self) -> bool {
        self.company_id.is_none()
    }
    #[must_use]
    pub const fn is_vendor(&self) -> bool {
        !self.is_sig()
    }
}
impl Display for ModelIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.company_id {
            None => write!(f, "{}", self.model_id),
            Some(company) => write!(f, "{}:{}", company, self.model_id),
        }
    }
}

/// 16-bit SIG opcode packed big-endian at the start of a model payload.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Opcode(pub u16);
impl Opcode {
    pub const fn byte_len() -> usize {
        2
    }
    /// Splits a payload into its leading opcode and parameters.
    #[must_use]
    pub fn split(payload: &[u8]) -> Option<(Opcode, &[u8])> {
        if payload.len() < Self::byte_len() {
            None
        } else {
            let opcode = Opcode(u16::from_be_bytes([payload[0], payload[1]]));
            Some((opcode, &payload[Self::byte_len()..]))
        }
    }
    /// Builds a payload from this opcode followed by `parameters`.
    #[must_use]
    pub fn with_parameters(self, parameters: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::byte_len() + parameters.len());
        out.extend_from_slice(&self.0.to_be_bytes());
        out.extend_from_slice(parameters);
        out
    }
}
impl Display for Opcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_split() {
        let payload = Opcode(0x8202).with_parameters(&[0x01]);
        assert_eq!(payload, vec![0x82, 0x02, 0x01]);
        let (opcode, params) = Opcode::split(&payload).unwrap();
        assert_eq!(opcode, Opcode(0x8202));
        assert_eq!(params, &[0x01]);
        assert_eq!(Opcode::split(&[0x82]), None);
    }
    #[test]
    fn test_identifier_kinds() {
        let sig = ModelIdentifier::new_sig(ModelId(0x1000));
        let vendor = ModelIdentifier::new_vendor(ModelId(0x0001), CompanyId(0x05F1));
        assert!(sig.is_sig() && !sig.is_vendor());
        assert!(vendor.is_vendor());
        assert_eq!(sig.to_string(), "1000");
        assert_eq!(vendor.to_string(), "05f1:0001");
    }
}
