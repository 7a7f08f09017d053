use meridian_chain::{MeridianDeserialize, MeridianSerialize, SerializationError};

/// The 12-byte NUL-padded ASCII command field of the frame header.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Command {
    Version,
    Verack,
    Ping,
    Pong,
    Reject,
    GetAddr,
    Addr,
    GetBlocks,
    GetHeaders,
    Headers,
    Inv,
    GetData,
    NotFound,
    Block,
    Tx,
    Mempool,
}

impl Command {
    pub fn name(self) -> &'static str {
        match self {
            Command::Version => "version",
            Command::Verack => "verack",
            Command::Ping => "ping",
            Command::Pong => "pong",
            Command::Reject => "reject",
            Command::GetAddr => "getaddr",
            Command::Addr => "addr",
            Command::GetBlocks => "getblocks",
            Command::GetHeaders => "getheaders",
            Command::Headers => "headers",
            Command::Inv => "inv",
            Command::GetData => "getdata",
            Command::NotFound => "notfound",
            Command::Block => "block",
            Command::Tx => "tx",
            Command::Mempool => "mempool",
        }
    }

    /// The NUL-padded field as written to the wire.
    pub fn bytes(self) -> [u8; 12] {
        let mut field = [0u8; 12];
        let name = self.name().as_bytes();
        field[..name.len()].copy_from_slice(name);
        field
    }

    fn from_bytes(field: [u8; 12]) -> Option<Command> {
        let len = field.iter().position(|&b| b == 0).unwrap_or(12);
        // Padding must be all NUL.
        if field[len..].iter().any(|&b| b != 0) {
            return None;
        }
        Some(match &field[..len] {
            b"version" => Command::Version,
            b"verack" => Command::Verack,
            b"ping" => Command::Ping,
            b"pong" => Command::Pong,
            b"reject" => Command::Reject,
            b"getaddr" => Command::GetAddr,
            b"addr" => Command::Addr,
            b"getblocks" => Command::GetBlocks,
            b"getheaders" => Command::GetHeaders,
            b"headers" => Command::Headers,
            b"inv" => Command::Inv,
            b"getdata" => Command::GetData,
            b"notfound" => Command::NotFound,
            b"block" => Command::Block,
            b"tx" => Command::Tx,
            b"mempool" => Command::Mempool,
            _ => return None,
        })
    }
}

impl MeridianSerialize for Command {
    fn mrd_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.bytes().mrd_serialize(target)
    }
}

impl MeridianDeserialize for Command {
    fn mrd_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let field = <[u8; 12]>::mrd_deserialize(&mut reader)?;
        Command::from_bytes(field).ok_or(SerializationError::Parse("unknown command"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_round_trip_with_nul_padding() {
        meridian_test::init();

        let all = [
            Command::Version,
            Command::Verack,
            Command::Ping,
            Command::Pong,
            Command::Reject,
            Command::GetAddr,
            Command::Addr,
            Command::GetBlocks,
            Command::GetHeaders,
            Command::Headers,
            Command::Inv,
            Command::GetData,
            Command::NotFound,
            Command::Block,
            Command::Tx,
            Command::Mempool,
        ];
        for command in all {
            let bytes = command.bytes();
            assert_eq!(Command::from_bytes(bytes), Some(command));
        }

        // Garbage after the NUL terminator is rejected.
        let mut dirty = Command::Ping.bytes();
        dirty[11] = b'x';
        assert_eq!(Command::from_bytes(dirty), None);
    }
}
