//! A Tokio codec mapping byte streams to Meridian message streams.
//!
//! Frame layout: `magic(4) ‖ command(12) ‖ length(4, LE) ‖ checksum(4)`
//! followed by `length` payload bytes, where the checksum is the first
//! four bytes of the payload's SHA-256d digest.

use std::fmt;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use meridian_chain::{
    block::Block,
    parameters::Network,
    serialization::{
        mrd_deserialize_list, sha256d, MeridianDeserialize, MeridianSerialize,
        SerializationError as Error,
    },
    transaction::Transaction,
};

use crate::constants::{
    MAX_ADDRS_PER_MESSAGE, MAX_HEADERS_PER_MESSAGE, MAX_INV_PER_MESSAGE, MAX_MESSAGE_SIZE,
};
use crate::message::{Command, CountedHeader, GetBlocks, Message, RejectReason, Version};
use crate::meta_addr::MetaAddr;
use crate::types::{Magic, Nonce};

/// The length of a message frame header.
const HEADER_LEN: usize = 24;

/// A codec which produces Meridian messages from byte streams and vice
/// versa.
pub struct Codec {
    builder: Builder,
    state: DecodeState,
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec").field("state", &self.state).finish()
    }
}

/// A builder for specifying [`Codec`] options.
#[derive(Debug)]
pub struct Builder {
    /// The network magic to expect and emit.
    network: Network,
    /// The maximum allowable body length.
    max_len: usize,
    /// An optional label for metrics reporting.
    metrics_label: Option<String>,
}

impl Codec {
    /// Return a builder for constructing a [`Codec`].
    pub fn builder() -> Builder {
        Builder {
            network: Network::Mainnet,
            max_len: MAX_MESSAGE_SIZE,
            metrics_label: None,
        }
    }
}

impl Builder {
    /// Finalize the builder and return a [`Codec`].
    pub fn finish(self) -> Codec {
        Codec {
            builder: self,
            state: DecodeState::Head,
        }
    }

    /// Configure the codec for the given [`Network`].
    pub fn for_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Configure the codec's maximum accepted body size, in bytes.
    pub fn with_max_body_len(mut self, len: usize) -> Self {
        self.max_len = len;
        self
    }

    /// Label this codec's metrics with a peer address.
    pub fn with_metrics_label(mut self, metrics_label: String) -> Self {
        self.metrics_label = Some(metrics_label);
        self
    }
}

// ======== Encoding =========

impl Encoder<Message> for Codec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        // The header carries a checksum of the body, so the body has to be
        // serialized first.
        let mut body = Vec::new();
        write_body(&item, &mut body)?;

        if body.len() > self.builder.max_len {
            return Err(Error::Parse("body length exceeded maximum size"));
        }

        if let Some(label) = self.builder.metrics_label.clone() {
            metrics::counter!("bytes.written", (body.len() + HEADER_LEN) as u64, "addr" => label);
        }
        trace!(command = %item, len = body.len(), "encoding message");

        let mut header = [0u8; HEADER_LEN];
        let mut header_writer = Cursor::new(&mut header[..]);
        header_writer.write_all(&Magic::from(self.builder.network).0[..])?;
        header_writer.write_all(&item.command().bytes())?;
        header_writer.write_u32::<LittleEndian>(body.len() as u32)?;
        header_writer.write_all(&sha256d::Checksum::from(&body[..]).0)?;

        dst.reserve(HEADER_LEN + body.len());
        dst.put_slice(&header);
        dst.put_slice(&body);

        Ok(())
    }
}

fn write_body<W: Write>(msg: &Message, mut writer: W) -> Result<(), Error> {
    match msg {
        Message::Version(version) => version.mrd_serialize(&mut writer)?,
        Message::Verack => { /* Empty payload */ }
        Message::Ping(nonce) => nonce.mrd_serialize(&mut writer)?,
        Message::Pong(nonce) => nonce.mrd_serialize(&mut writer)?,
        Message::Reject {
            message,
            ccode,
            reason,
            data,
        } => {
            message.mrd_serialize(&mut writer)?;
            writer.write_all(&[*ccode as u8])?;
            reason.mrd_serialize(&mut writer)?;
            if let Some(data) = data {
                writer.write_all(data)?;
            }
        }
        Message::GetAddr => { /* Empty payload */ }
        Message::Addr(addrs) => addrs.mrd_serialize(&mut writer)?,
        Message::GetBlocks(get_blocks) => get_blocks.mrd_serialize(&mut writer)?,
        Message::GetHeaders(get_headers) => get_headers.mrd_serialize(&mut writer)?,
        Message::Headers(headers) => headers.mrd_serialize(&mut writer)?,
        Message::Inv(hashes) => hashes.mrd_serialize(&mut writer)?,
        Message::GetData(hashes) => hashes.mrd_serialize(&mut writer)?,
        Message::NotFound(hashes) => hashes.mrd_serialize(&mut writer)?,
        Message::Block(block) => block.mrd_serialize(&mut writer)?,
        Message::Tx(transaction) => transaction.mrd_serialize(&mut writer)?,
        Message::Mempool => { /* Empty payload */ }
    }
    Ok(())
}

// ======== Decoding =========

enum DecodeState {
    Head,
    Body {
        body_len: usize,
        command: Command,
        checksum: sha256d::Checksum,
    },
}

impl fmt::Debug for DecodeState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeState::Head => write!(f, "DecodeState::Head"),
            DecodeState::Body {
                body_len, command, ..
            } => f
                .debug_struct("DecodeState::Body")
                .field("body_len", &body_len)
                .field("command", &command)
                .finish(),
        }
    }
}

impl Decoder for Codec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.state {
            DecodeState::Head => {
                // Wait for an entire header before parsing any of it.
                if src.len() < HEADER_LEN {
                    return Ok(None);
                }

                let header = src.split_to(HEADER_LEN);
                let mut header_reader = Cursor::new(&header);
                let magic = Magic(<[u8; 4]>::mrd_deserialize(&mut header_reader)?);
                let command = Command::mrd_deserialize(&mut header_reader)?;
                let body_len = header_reader.read_u32::<LittleEndian>()? as usize;
                let checksum = sha256d::Checksum(<[u8; 4]>::mrd_deserialize(&mut header_reader)?);
                trace!(?command, body_len, "read header from src buffer");

                if magic != Magic::from(self.builder.network) {
                    return Err(Error::Parse("supplied magic did not meet expectations"));
                }
                if body_len > self.builder.max_len {
                    return Err(Error::OversizedArray {
                        len: body_len as u64,
                        max: self.builder.max_len as u64,
                    });
                }

                if let Some(label) = self.builder.metrics_label.clone() {
                    metrics::counter!("bytes.read", (body_len + HEADER_LEN) as u64, "addr" => label);
                }

                // Reserve for the body plus the next header.
                src.reserve(body_len + HEADER_LEN);

                self.state = DecodeState::Body {
                    body_len,
                    command,
                    checksum,
                };

                // Now that the state is updated, recurse to attempt body
                // decoding.
                self.decode(src)
            }
            DecodeState::Body {
                body_len,
                command,
                checksum,
            } => {
                if src.len() < body_len {
                    return Ok(None);
                }

                // Reset the decoder state before parsing, otherwise the
                // next header would be read as part of this body.
                let body = src.split_to(body_len);
                self.state = DecodeState::Head;

                if checksum != sha256d::Checksum::from(&body[..]) {
                    return Err(Error::Parse(
                        "supplied message checksum does not match computed checksum",
                    ));
                }

                let mut body_reader = Cursor::new(&body);
                let msg = match command {
                    Command::Version => {
                        Message::Version(Version::mrd_deserialize(&mut body_reader)?)
                    }
                    Command::Verack => Message::Verack,
                    Command::Ping => Message::Ping(Nonce::mrd_deserialize(&mut body_reader)?),
                    Command::Pong => Message::Pong(Nonce::mrd_deserialize(&mut body_reader)?),
                    Command::Reject => read_reject(&mut body_reader)?,
                    Command::GetAddr => Message::GetAddr,
                    Command::Addr => Message::Addr(mrd_deserialize_list::<MetaAddr, _>(
                        &mut body_reader,
                        MAX_ADDRS_PER_MESSAGE as u64,
                    )?),
                    Command::GetBlocks => {
                        Message::GetBlocks(GetBlocks::mrd_deserialize(&mut body_reader)?)
                    }
                    Command::GetHeaders => {
                        Message::GetHeaders(GetBlocks::mrd_deserialize(&mut body_reader)?)
                    }
                    Command::Headers => Message::Headers(mrd_deserialize_list::<CountedHeader, _>(
                        &mut body_reader,
                        MAX_HEADERS_PER_MESSAGE as u64,
                    )?),
                    Command::Inv => Message::Inv(read_inv_list(&mut body_reader)?),
                    Command::GetData => Message::GetData(read_inv_list(&mut body_reader)?),
                    Command::NotFound => Message::NotFound(read_inv_list(&mut body_reader)?),
                    Command::Block => {
                        Message::Block(<Arc<Block>>::mrd_deserialize(&mut body_reader)?)
                    }
                    Command::Tx => Message::Tx(<Arc<Transaction>>::mrd_deserialize(&mut body_reader)?),
                    Command::Mempool => Message::Mempool,
                };
                trace!("finished message decoding");
                Ok(Some(msg))
            }
        }
    }
}

fn read_inv_list<R: Read>(reader: R) -> Result<Vec<crate::inv::InventoryHash>, Error> {
    mrd_deserialize_list(reader, MAX_INV_PER_MESSAGE as u64)
}

fn read_reject<R: Read>(mut reader: R) -> Result<Message, Error> {
    Ok(Message::Reject {
        message: String::mrd_deserialize(&mut reader)?,
        ccode: RejectReason::from_code(u8::mrd_deserialize(&mut reader)?)
            .ok_or(Error::Parse("invalid RejectReason value in ccode field"))?,
        reason: String::mrd_deserialize(&mut reader)?,
        // There is no length field for the data; its presence is implied
        // by the body length. All senders use either 32 bytes (the hash of
        // the rejected object) or nothing, so try to read 32 bytes and
        // accept a clean miss.
        data: <[u8; 32]>::mrd_deserialize(&mut reader).ok(),
    })
}
