//! DNS message parsing and construction.
//!
//! Only the parts of the wire format the relay decides on are decoded: the
//! header and the first question. Synthesized responses copy the question
//! section from the query verbatim and point the answer name back at it.

use std::net::Ipv4Addr;

use tracing::warn;

use crate::error::DecodeError;

pub const HEADER_LEN: usize = 12;

pub const TYPE_A: u16 = 1;
pub const TYPE_AAAA: u16 = 28;
pub const CLASS_IN: u16 = 1;

/// TTL of locally answered records, in seconds.
pub const ANSWER_TTL: u32 = 3600;

const FLAG_QR: u8 = 0x80;
const FLAG_AA: u8 = 0x04;
const FLAG_RD: u8 = 0x01;
const FLAG_RA: u8 = 0x80;
const RCODE_MASK: u8 = 0x0F;

/// Label length bytes with these bits set are pointers or extended labels.
const LABEL_TYPE_MASK: u8 = 0xC0;

/// Longest label an ordinary length byte can describe.
pub const MAX_LABEL_LEN: usize = 63;

/// Compression pointer to offset 12, where the question name starts.
const QUESTION_NAME_POINTER: [u8; 2] = [0xC0, 0x0C];

/// Response codes produced by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Rcode {
    NoError = 0,
    ServFail = 2,
    NxDomain = 3,
}

/// The fixed 12-byte message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub id: u16,
    pub flags: [u8; 2],
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl Header {
    /// Read the header at the start of `data`.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let h = data.get(..HEADER_LEN)?;
        let word = |i: usize| u16::from_be_bytes([h[i], h[i + 1]]);

        Some(Self {
            id: word(0),
            flags: [h[2], h[3]],
            qdcount: word(4),
            ancount: word(6),
            nscount: word(8),
            arcount: word(10),
        })
    }

    pub fn is_response(&self) -> bool {
        self.flags[0] & FLAG_QR != 0
    }

    pub fn authoritative(&self) -> bool {
        self.flags[0] & FLAG_AA != 0
    }

    pub fn recursion_desired(&self) -> bool {
        self.flags[0] & FLAG_RD != 0
    }

    pub fn recursion_available(&self) -> bool {
        self.flags[1] & FLAG_RA != 0
    }

    pub fn rcode(&self) -> u8 {
        self.flags[1] & RCODE_MASK
    }
}

/// A parsed DNS query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuery {
    pub id: u16,
    pub recursion_desired: bool,
    /// Lowercase dotted name, without trailing dot.
    pub domain: String,
    pub qtype: u16,
    pub qclass: u16,
    /// Offset one past the QCLASS field of the first question.
    pub question_end: usize,
}

impl DnsQuery {
    /// Parse the header and first question of a query.
    ///
    /// Only plain labels are accepted in the question name. A length byte
    /// with either of the top two bits set (compression pointers and the
    /// extended label types 0x40-0xBF) fails with
    /// [`DecodeError::UnsupportedLabel`], even when enough bytes follow.
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        let header = Header::parse(data).ok_or(DecodeError::TooShort(data.len()))?;
        if header.is_response() {
            return Err(DecodeError::NotAQuery);
        }
        if header.qdcount == 0 {
            return Err(DecodeError::NoQuestion);
        }

        let mut pos = HEADER_LEN;
        let mut domain = String::new();

        loop {
            let Some(&label_len) = data.get(pos) else {
                return Err(DecodeError::LabelOverrun { offset: pos });
            };
            if label_len == 0 {
                pos += 1;
                break;
            }
            if label_len & LABEL_TYPE_MASK != 0 {
                return Err(DecodeError::UnsupportedLabel {
                    offset: pos,
                    byte: label_len,
                });
            }

            let start = pos + 1;
            let end = start + label_len as usize;
            if end > data.len() {
                return Err(DecodeError::LabelOverrun { offset: pos });
            }
            if !domain.is_empty() {
                domain.push('.');
            }
            domain.push_str(&String::from_utf8_lossy(&data[start..end]));
            pos = end;
        }

        if pos + 4 > data.len() {
            return Err(DecodeError::MissingQuestionFields);
        }
        let qtype = u16::from_be_bytes([data[pos], data[pos + 1]]);
        let qclass = u16::from_be_bytes([data[pos + 2], data[pos + 3]]);

        Ok(Self {
            id: header.id,
            recursion_desired: header.recursion_desired(),
            domain: domain.to_lowercase(),
            qtype,
            qclass,
            question_end: pos + 4,
        })
    }
}

/// What a synthesized response says.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Name is blocked locally: NXDOMAIN, no answer.
    Blocked,
    /// Name is known locally: NOERROR with one answer.
    LocalAnswer(Ipv4Addr),
    /// Upstream gave no usable reply: SERVFAIL, no answer.
    ServerFailure,
}

impl ResponseKind {
    pub fn rcode(self) -> Rcode {
        match self {
            ResponseKind::Blocked => Rcode::NxDomain,
            ResponseKind::LocalAnswer(_) => Rcode::NoError,
            ResponseKind::ServerFailure => Rcode::ServFail,
        }
    }

    /// Local decisions are authoritative, upstream failures are not.
    fn authoritative(self) -> bool {
        !matches!(self, ResponseKind::ServerFailure)
    }
}

/// Build a response to `query`, echoing the question section of `packet`.
///
/// If the question section cannot be located in `packet`, only the header
/// is returned.
pub fn build_response(query: &DnsQuery, packet: &[u8], kind: ResponseKind) -> Vec<u8> {
    let answer = match kind {
        ResponseKind::LocalAnswer(addr) => Some(addr),
        _ => None,
    };

    let mut flags = FLAG_QR;
    if kind.authoritative() {
        flags |= FLAG_AA;
    }
    if query.recursion_desired {
        flags |= FLAG_RD;
    }

    let mut data = Vec::with_capacity(512);

    // Header
    data.extend_from_slice(&query.id.to_be_bytes());
    data.push(flags);
    data.push(FLAG_RA | kind.rcode() as u8);
    data.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    data.extend_from_slice(&u16::from(answer.is_some()).to_be_bytes()); // ANCOUNT
    data.extend_from_slice(&[0x00, 0x00]); // NSCOUNT
    data.extend_from_slice(&[0x00, 0x00]); // ARCOUNT

    let Some(question) = question_section(packet) else {
        warn!(id = query.id, "question section not found, sending header only");
        return data;
    };
    data.extend_from_slice(question);

    if let Some(addr) = answer {
        data.extend_from_slice(&QUESTION_NAME_POINTER);
        data.extend_from_slice(&query.qtype.to_be_bytes());
        data.extend_from_slice(&query.qclass.to_be_bytes());
        data.extend_from_slice(&ANSWER_TTL.to_be_bytes());
        data.extend_from_slice(&4u16.to_be_bytes());
        data.extend_from_slice(&addr.octets());
    }

    data
}

/// Locate the first question (name, QTYPE, QCLASS) in a raw message.
pub fn question_section(packet: &[u8]) -> Option<&[u8]> {
    let mut pos = HEADER_LEN;
    loop {
        let label_len = *packet.get(pos)? as usize;
        if label_len == 0 {
            break;
        }
        pos += 1 + label_len;
    }
    packet.get(HEADER_LEN..pos + 1 + 4)
}

/// Build a standard recursive query for `domain` in class IN.
///
/// Returns `None` if a label is longer than [`MAX_LABEL_LEN`] bytes.
pub fn build_query(id: u16, domain: &str, qtype: u16) -> Option<Vec<u8>> {
    let mut packet = Vec::with_capacity(512);

    packet.extend_from_slice(&id.to_be_bytes());
    packet.extend_from_slice(&[FLAG_RD, 0x00]);
    packet.extend_from_slice(&[0x00, 0x01]); // QDCOUNT
    packet.extend_from_slice(&[0x00, 0x00]); // ANCOUNT
    packet.extend_from_slice(&[0x00, 0x00]); // NSCOUNT
    packet.extend_from_slice(&[0x00, 0x00]); // ARCOUNT

    for label in domain.split('.').filter(|l| !l.is_empty()) {
        if label.len() > MAX_LABEL_LEN {
            return None;
        }
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0x00);

    packet.extend_from_slice(&qtype.to_be_bytes());
    packet.extend_from_slice(&CLASS_IN.to_be_bytes());
    Some(packet)
}
