//! # Transactions
//!
//! Inputs spend a previous output point; outputs carry a value, a locking
//! script, and an attachment. The transaction hash is the double SHA-256
//! of the full wire encoding and identifies the transaction everywhere in
//! the store.

use eyre::Result;

use crate::encoding::{varint::varint_len, Reader, Writer};

use super::attachment::Attachment;
use super::hash::{sha256d, Hash256};
use super::point::{OutPoint, POINT_SIZE};
use super::script::Script;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Input {
    pub previous_output: OutPoint,
    pub script: Script,
    pub sequence: u32,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Output {
    pub value: u64,
    pub script: Script,
    pub attachment: Attachment,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub lock_time: u32,
}

impl Input {
    pub fn serialized_size(&self) -> usize {
        POINT_SIZE + self.script.serialized_size() + 4
    }

    pub fn encode(&self, writer: &mut Writer<'_>) {
        self.previous_output.encode(writer);
        self.script.encode(writer);
        writer.put_u32(self.sequence);
    }

    pub fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            previous_output: OutPoint::decode(reader)?,
            script: Script::decode(reader)?,
            sequence: reader.get_u32()?,
        })
    }
}

impl Output {
    pub fn serialized_size(&self) -> usize {
        8 + self.script.serialized_size() + self.attachment.serialized_size()
    }

    pub fn encode(&self, writer: &mut Writer<'_>) {
        writer.put_u64(self.value);
        self.script.encode(writer);
        self.attachment.encode(writer);
    }

    pub fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            value: reader.get_u64()?,
            script: Script::decode(reader)?,
            attachment: Attachment::decode(reader)?,
        })
    }
}

impl Transaction {
    /// A coinbase spends the null point and creates value from subsidy.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    pub fn hash(&self) -> Hash256 {
        sha256d(&self.to_bytes())
    }

    pub fn serialized_size(&self) -> usize {
        4 + varint_len(self.inputs.len() as u64)
            + self
                .inputs
                .iter()
                .map(Input::serialized_size)
                .sum::<usize>()
            + varint_len(self.outputs.len() as u64)
            + self
                .outputs
                .iter()
                .map(Output::serialized_size)
                .sum::<usize>()
            + 4
    }

    pub fn encode(&self, writer: &mut Writer<'_>) {
        writer.put_u32(self.version);
        writer.put_varint(self.inputs.len() as u64);
        for input in &self.inputs {
            input.encode(writer);
        }
        writer.put_varint(self.outputs.len() as u64);
        for output in &self.outputs {
            output.encode(writer);
        }
        writer.put_u32(self.lock_time);
    }

    pub fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let version = reader.get_u32()?;

        let input_count = reader.get_varint()? as usize;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            inputs.push(Input::decode(reader)?);
        }

        let output_count = reader.get_varint()? as usize;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            outputs.push(Output::decode(reader)?);
        }

        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time: reader.get_u32()?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.serialized_size()];
        let mut writer = Writer::new(&mut buf);
        self.encode(&mut writer);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::hash::{sha256, short_hash};

    fn sample() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![Input {
                previous_output: OutPoint::new(sha256(b"prev"), 1),
                script: Script::new(vec![0x51]),
                sequence: u32::MAX,
            }],
            outputs: vec![Output {
                value: 100,
                script: Script::pay_to_address(&short_hash(b"payee")),
                attachment: Attachment::Value,
            }],
            lock_time: 0,
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let tx = sample();
        let raw = tx.to_bytes();
        assert_eq!(raw.len(), tx.serialized_size());

        let mut reader = Reader::new(&raw);
        assert_eq!(Transaction::decode(&mut reader).unwrap(), tx);
    }

    #[test]
    fn hash_is_stable_and_content_sensitive() {
        let tx = sample();
        assert_eq!(tx.hash(), sample().hash());

        let mut altered = sample();
        altered.outputs[0].value = 101;
        assert_ne!(tx.hash(), altered.hash());
    }

    #[test]
    fn coinbase_detection() {
        let mut tx = sample();
        assert!(!tx.is_coinbase());

        tx.inputs[0].previous_output = OutPoint::NULL;
        assert!(tx.is_coinbase());
    }
}
