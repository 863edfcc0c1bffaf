use bytes::Bytes;
use std::fmt;

pub mod codec;
pub mod mask;

/// Frame type discriminator, the low four bits of the first header byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    Continue,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    /// A reserved opcode; carried through so it can be logged and dropped.
    Reserved(u8),
}

impl From<u8> for Opcode {
    fn from(code: u8) -> Self {
        match code & 0x0F {
            0x0 => Opcode::Continue,
            0x1 => Opcode::Text,
            0x2 => Opcode::Binary,
            0x8 => Opcode::Close,
            0x9 => Opcode::Ping,
            0xA => Opcode::Pong,
            other => Opcode::Reserved(other),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        match op {
            Opcode::Continue => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
            Opcode::Reserved(code) => code & 0x0F,
        }
    }
}

impl Opcode {
    pub fn is_control(self) -> bool {
        u8::from(self) & 0x8 != 0
    }
}

/// The decoded fixed part of a frame, everything before the mask key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Head {
    pub fin: bool,
    pub rsv: [bool; 3],
    pub opcode: Opcode,
    pub masked: bool,
    pub payload_len: u64,
}

/// A complete frame with its payload already unmasked.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(opcode: Opcode, fin: bool, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            opcode,
            payload: payload.into(),
        }
    }

    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Text, true, payload)
    }

    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Ping, true, payload)
    }

    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Pong, true, payload)
    }

    /// A close frame carrying a status code and a UTF-8 reason.
    pub fn close(code: u16, reason: &str) -> Self {
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.to_be_bytes());
        payload.extend_from_slice(reason.as_bytes());
        Self::new(Opcode::Close, true, payload)
    }

    /// Encodes the frame for sending from the server side, unmasked.
    pub fn encode(&self) -> Bytes {
        codec::encode(self.opcode, self.fin, &self.payload)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("fin", &self.fin)
            .field("opcode", &self.opcode)
            .field("len", &self.payload.len())
            .finish()
    }
}
