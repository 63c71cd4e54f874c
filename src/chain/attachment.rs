//! # Attachments
//!
//! The structured payload a transaction output can carry beyond its plain
//! value: asset issuance and transfer, asset certificates, digital
//! identity registration and transfer, free-form messages, and consensus
//! subsidy awards. Modeled as a closed sum dispatched on a single leading
//! tag byte - the format is fixed and versioned, and an unknown tag is a
//! decode error, never a silent skip.
//!
//! Attachment bytes are embedded in fixed-capacity business-row slots, so
//! every payload has a bounded serialized size enforced at store time.

use eyre::{bail, Result};

use crate::encoding::{wire::sized_bytes_len, Reader, Writer};

const TAG_VALUE: u8 = 0;
const TAG_ASSET_ISSUE: u8 = 1;
const TAG_ASSET_TRANSFER: u8 = 2;
const TAG_MESSAGE: u8 = 3;
const TAG_SUBSIDY_AWARD: u8 = 4;
const TAG_IDENTITY_REGISTER: u8 = 5;
const TAG_IDENTITY_TRANSFER: u8 = 6;
const TAG_ASSET_CERT: u8 = 7;

/// Full definition of an issued asset, stored in the symbol registry and
/// echoed in the issuing output's business row.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AssetDetail {
    pub symbol: String,
    pub max_supply: u64,
    pub decimals: u8,
    pub issuer: String,
    pub address: String,
    pub description: String,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AssetTransfer {
    pub symbol: String,
    pub quantity: u64,
}

/// A capability certificate over an asset symbol (issue, domain, naming).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AssetCert {
    pub symbol: String,
    pub owner: String,
    pub address: String,
    pub cert_type: u32,
}

/// A digital identity binding a symbol to an address.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Identity {
    pub symbol: String,
    pub address: String,
}

/// Block subsidy granted by the non-proof-of-work consensus paths.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SubsidyAward {
    pub height: u32,
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub enum Attachment {
    /// Plain value transfer; no structured payload.
    #[default]
    Value,
    AssetIssue(AssetDetail),
    AssetTransfer(AssetTransfer),
    Message(String),
    SubsidyAward(SubsidyAward),
    IdentityRegister(Identity),
    IdentityTransfer(Identity),
    AssetCert(AssetCert),
}

impl Attachment {
    pub fn tag(&self) -> u8 {
        match self {
            Attachment::Value => TAG_VALUE,
            Attachment::AssetIssue(_) => TAG_ASSET_ISSUE,
            Attachment::AssetTransfer(_) => TAG_ASSET_TRANSFER,
            Attachment::Message(_) => TAG_MESSAGE,
            Attachment::SubsidyAward(_) => TAG_SUBSIDY_AWARD,
            Attachment::IdentityRegister(_) => TAG_IDENTITY_REGISTER,
            Attachment::IdentityTransfer(_) => TAG_IDENTITY_TRANSFER,
            Attachment::AssetCert(_) => TAG_ASSET_CERT,
        }
    }

    pub fn serialized_size(&self) -> usize {
        1 + match self {
            Attachment::Value => 0,
            Attachment::AssetIssue(detail) => detail.serialized_size(),
            Attachment::AssetTransfer(transfer) => {
                sized_bytes_len(transfer.symbol.as_bytes()) + 8
            }
            Attachment::Message(content) => sized_bytes_len(content.as_bytes()),
            Attachment::SubsidyAward(_) => 4,
            Attachment::IdentityRegister(identity) | Attachment::IdentityTransfer(identity) => {
                identity.serialized_size()
            }
            Attachment::AssetCert(cert) => cert.serialized_size(),
        }
    }

    pub fn encode(&self, writer: &mut Writer<'_>) {
        writer.put_u8(self.tag());
        match self {
            Attachment::Value => {}
            Attachment::AssetIssue(detail) => detail.encode(writer),
            Attachment::AssetTransfer(transfer) => {
                writer.put_str(&transfer.symbol);
                writer.put_u64(transfer.quantity);
            }
            Attachment::Message(content) => writer.put_str(content),
            Attachment::SubsidyAward(award) => writer.put_u32(award.height),
            Attachment::IdentityRegister(identity) | Attachment::IdentityTransfer(identity) => {
                identity.encode(writer)
            }
            Attachment::AssetCert(cert) => cert.encode(writer),
        }
    }

    pub fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let tag = reader.get_u8()?;
        Ok(match tag {
            TAG_VALUE => Attachment::Value,
            TAG_ASSET_ISSUE => Attachment::AssetIssue(AssetDetail::decode(reader)?),
            TAG_ASSET_TRANSFER => Attachment::AssetTransfer(AssetTransfer {
                symbol: reader.get_string()?,
                quantity: reader.get_u64()?,
            }),
            TAG_MESSAGE => Attachment::Message(reader.get_string()?),
            TAG_SUBSIDY_AWARD => Attachment::SubsidyAward(SubsidyAward {
                height: reader.get_u32()?,
            }),
            TAG_IDENTITY_REGISTER => Attachment::IdentityRegister(Identity::decode(reader)?),
            TAG_IDENTITY_TRANSFER => Attachment::IdentityTransfer(Identity::decode(reader)?),
            TAG_ASSET_CERT => Attachment::AssetCert(AssetCert::decode(reader)?),
            unknown => bail!("unknown attachment tag: {}", unknown),
        })
    }
}

impl AssetDetail {
    pub fn serialized_size(&self) -> usize {
        sized_bytes_len(self.symbol.as_bytes())
            + 8
            + 1
            + sized_bytes_len(self.issuer.as_bytes())
            + sized_bytes_len(self.address.as_bytes())
            + sized_bytes_len(self.description.as_bytes())
    }

    pub fn encode(&self, writer: &mut Writer<'_>) {
        writer.put_str(&self.symbol);
        writer.put_u64(self.max_supply);
        writer.put_u8(self.decimals);
        writer.put_str(&self.issuer);
        writer.put_str(&self.address);
        writer.put_str(&self.description);
    }

    pub fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            symbol: reader.get_string()?,
            max_supply: reader.get_u64()?,
            decimals: reader.get_u8()?,
            issuer: reader.get_string()?,
            address: reader.get_string()?,
            description: reader.get_string()?,
        })
    }
}

impl AssetCert {
    pub fn serialized_size(&self) -> usize {
        sized_bytes_len(self.symbol.as_bytes())
            + sized_bytes_len(self.owner.as_bytes())
            + sized_bytes_len(self.address.as_bytes())
            + 4
    }

    pub fn encode(&self, writer: &mut Writer<'_>) {
        writer.put_str(&self.symbol);
        writer.put_str(&self.owner);
        writer.put_str(&self.address);
        writer.put_u32(self.cert_type);
    }

    pub fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            symbol: reader.get_string()?,
            owner: reader.get_string()?,
            address: reader.get_string()?,
            cert_type: reader.get_u32()?,
        })
    }
}

impl Identity {
    pub fn serialized_size(&self) -> usize {
        sized_bytes_len(self.symbol.as_bytes()) + sized_bytes_len(self.address.as_bytes())
    }

    pub fn encode(&self, writer: &mut Writer<'_>) {
        writer.put_str(&self.symbol);
        writer.put_str(&self.address);
    }

    pub fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            symbol: reader.get_string()?,
            address: reader.get_string()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(attachment: Attachment) {
        let mut buf = vec![0u8; attachment.serialized_size()];
        let mut writer = Writer::new(&mut buf);
        attachment.encode(&mut writer);
        assert_eq!(writer.position(), buf.len());

        let mut reader = Reader::new(&buf);
        assert_eq!(Attachment::decode(&mut reader).unwrap(), attachment);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn all_variants_round_trip() {
        round_trip(Attachment::Value);
        round_trip(Attachment::AssetIssue(AssetDetail {
            symbol: "MVS.GOLD".into(),
            max_supply: 1_000_000,
            decimals: 8,
            issuer: "issuer-one".into(),
            address: "addr-one".into(),
            description: "a synthetic test asset".into(),
        }));
        round_trip(Attachment::AssetTransfer(AssetTransfer {
            symbol: "MVS.GOLD".into(),
            quantity: 500,
        }));
        round_trip(Attachment::Message("on-chain note".into()));
        round_trip(Attachment::SubsidyAward(SubsidyAward { height: 42 }));
        round_trip(Attachment::IdentityRegister(Identity {
            symbol: "alice".into(),
            address: "addr-alice".into(),
        }));
        round_trip(Attachment::IdentityTransfer(Identity {
            symbol: "alice".into(),
            address: "addr-bob".into(),
        }));
        round_trip(Attachment::AssetCert(AssetCert {
            symbol: "MVS.GOLD".into(),
            owner: "alice".into(),
            address: "addr-alice".into(),
            cert_type: 1,
        }));
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let mut reader = Reader::new(&[0xEE]);
        assert!(Attachment::decode(&mut reader).is_err());
    }
}
