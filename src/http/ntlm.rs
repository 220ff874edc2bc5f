// src/http/ntlm.rs

//! NTLMv2 messages for integrated Windows authentication.
//!
//! Only the client side of the three-message handshake is built here:
//! the negotiate message, parsing of the server challenge, and the
//! authenticate message. No signing or sealing keys are derived.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use md5::Md5;

use crate::error::{AppError, Result};

type HmacMd5 = Hmac<Md5>;

const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";
const NEGOTIATE: u32 = 1;
const CHALLENGE: u32 = 2;
const AUTHENTICATE: u32 = 3;

const NEGOTIATE_UNICODE: u32 = 0x0000_0001;
const NEGOTIATE_OEM: u32 = 0x0000_0002;
const REQUEST_TARGET: u32 = 0x0000_0004;
const NEGOTIATE_NTLM: u32 = 0x0000_0200;
const NEGOTIATE_ALWAYS_SIGN: u32 = 0x0000_8000;
const NEGOTIATE_EXTENDED_SESSIONSECURITY: u32 = 0x0008_0000;
const NEGOTIATE_128: u32 = 0x2000_0000;
const NEGOTIATE_56: u32 = 0x8000_0000;

const CLIENT_FLAGS: u32 = NEGOTIATE_UNICODE
    | NEGOTIATE_OEM
    | REQUEST_TARGET
    | NEGOTIATE_NTLM
    | NEGOTIATE_ALWAYS_SIGN
    | NEGOTIATE_EXTENDED_SESSIONSECURITY
    | NEGOTIATE_128
    | NEGOTIATE_56;

const AV_EOL: u16 = 0;
const AV_TIMESTAMP: u16 = 7;

/// Seconds between 1601-01-01 and 1970-01-01.
const FILETIME_EPOCH_OFFSET: u64 = 11_644_473_600;

const CHALLENGE_HEADER_LEN: usize = 48;
const AUTHENTICATE_HEADER_LEN: usize = 64;

/// Account split into the parts NTLM hashes separately.
#[derive(Clone, Copy)]
pub struct Account<'a> {
    pub domain: &'a str,
    pub user: &'a str,
    pub password: &'a str,
}

impl<'a> Account<'a> {
    /// Split a `DOMAIN\user` name. A bare name has an empty domain.
    pub fn from_qualified(name: &'a str, password: &'a str) -> Self {
        let (domain, user) = name.split_once('\\').unwrap_or(("", name));
        Self {
            domain,
            user,
            password,
        }
    }
}

/// Server challenge message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub flags: u32,
    pub server_challenge: [u8; 8],
    pub target_info: Vec<u8>,
}

impl Challenge {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < CHALLENGE_HEADER_LEN || &bytes[..8] != SIGNATURE {
            return Err(malformed("not an NTLM message"));
        }
        if read_u32(bytes, 8) != CHALLENGE {
            return Err(malformed("expected a challenge message"));
        }

        let mut server_challenge = [0u8; 8];
        server_challenge.copy_from_slice(&bytes[24..32]);

        let len = usize::from(read_u16(bytes, 40));
        let offset = read_u32(bytes, 44) as usize;
        let target_info = bytes
            .get(offset..offset + len)
            .ok_or_else(|| malformed("target info out of bounds"))?
            .to_vec();

        Ok(Self {
            flags: read_u32(bytes, 20),
            server_challenge,
            target_info,
        })
    }

    /// Server clock from the target info, as a FILETIME.
    pub fn timestamp(&self) -> Option<u64> {
        let mut pos = 0;
        while let Some(header) = self.target_info.get(pos..pos + 4) {
            let id = u16::from_le_bytes([header[0], header[1]]);
            let len = usize::from(u16::from_le_bytes([header[2], header[3]]));
            if id == AV_EOL {
                return None;
            }
            let value = self.target_info.get(pos + 4..pos + 4 + len)?;
            if id == AV_TIMESTAMP {
                return <[u8; 8]>::try_from(value).ok().map(u64::from_le_bytes);
            }
            pos += 4 + len;
        }
        None
    }
}

pub fn negotiate_message() -> Vec<u8> {
    let mut msg = Vec::with_capacity(32);
    msg.extend_from_slice(SIGNATURE);
    msg.extend_from_slice(&NEGOTIATE.to_le_bytes());
    msg.extend_from_slice(&CLIENT_FLAGS.to_le_bytes());
    // empty domain and workstation fields
    msg.extend_from_slice(&[0u8; 16]);
    msg
}

/// Build the authenticate message answering `challenge`.
///
/// `timestamp` is a FILETIME; prefer [`Challenge::timestamp`] when present.
pub fn authenticate_message(
    account: &Account<'_>,
    challenge: &Challenge,
    client_challenge: [u8; 8],
    timestamp: u64,
) -> Result<Vec<u8>> {
    let key = ntowf_v2(account)?;
    let lm = lmv2_response(&key, &challenge.server_challenge, &client_challenge)?;
    let nt = ntv2_response(
        &key,
        &challenge.server_challenge,
        &client_challenge,
        timestamp,
        &challenge.target_info,
    )?;
    let domain = utf16le(account.domain);
    let user = utf16le(account.user);

    // lm, nt, domain, user, workstation, session key
    let payloads: [&[u8]; 6] = [&lm, &nt, &domain, &user, &[], &[]];
    let total: usize = payloads.iter().map(|p| p.len()).sum();

    let mut msg = Vec::with_capacity(AUTHENTICATE_HEADER_LEN + total);
    msg.extend_from_slice(SIGNATURE);
    msg.extend_from_slice(&AUTHENTICATE.to_le_bytes());

    let mut offset = AUTHENTICATE_HEADER_LEN;
    for payload in payloads {
        let len = u16::try_from(payload.len()).map_err(|_| malformed("field too long"))?;
        let at = u32::try_from(offset).map_err(|_| malformed("message too long"))?;
        msg.extend_from_slice(&len.to_le_bytes());
        msg.extend_from_slice(&len.to_le_bytes());
        msg.extend_from_slice(&at.to_le_bytes());
        offset += payload.len();
    }
    msg.extend_from_slice(&(challenge.flags & CLIENT_FLAGS).to_le_bytes());

    for payload in payloads {
        msg.extend_from_slice(payload);
    }
    Ok(msg)
}

/// `Authorization` header value carrying `message`.
pub fn authorization(message: &[u8]) -> String {
    format!("NTLM {}", BASE64.encode(message))
}

/// Whether a `WWW-Authenticate` value offers NTLM.
pub fn offers_ntlm(header: &str) -> bool {
    header
        .split_whitespace()
        .next()
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("ntlm"))
}

/// Decode the token of a `WWW-Authenticate: NTLM <token>` value.
pub fn challenge_token(header: &str) -> Option<Vec<u8>> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("ntlm") {
        return None;
    }
    BASE64.decode(token.trim()).ok()
}

/// Current time as a FILETIME (100ns ticks since 1601).
pub fn now_filetime() -> u64 {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (since_epoch.as_secs() + FILETIME_EPOCH_OFFSET) * 10_000_000
        + u64::from(since_epoch.subsec_nanos() / 100)
}

fn nt_hash(password: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&Md4::digest(utf16le(password)));
    out
}

fn ntowf_v2(account: &Account<'_>) -> Result<[u8; 16]> {
    let identity = utf16le(&format!("{}{}", account.user.to_uppercase(), account.domain));
    hmac_md5(&nt_hash(account.password), &[identity.as_slice()])
}

fn lmv2_response(key: &[u8; 16], server: &[u8; 8], client: &[u8; 8]) -> Result<Vec<u8>> {
    let mut response = hmac_md5(key, &[server.as_slice(), client.as_slice()])?.to_vec();
    response.extend_from_slice(client);
    Ok(response)
}

fn ntv2_response(
    key: &[u8; 16],
    server: &[u8; 8],
    client: &[u8; 8],
    timestamp: u64,
    target_info: &[u8],
) -> Result<Vec<u8>> {
    let mut blob = Vec::with_capacity(32 + target_info.len());
    blob.extend_from_slice(&[1, 1, 0, 0, 0, 0, 0, 0]);
    blob.extend_from_slice(&timestamp.to_le_bytes());
    blob.extend_from_slice(client);
    blob.extend_from_slice(&[0; 4]);
    blob.extend_from_slice(target_info);
    blob.extend_from_slice(&[0; 4]);

    let mut response = hmac_md5(key, &[server.as_slice(), blob.as_slice()])?.to_vec();
    response.extend_from_slice(&blob);
    Ok(response)
}

fn hmac_md5(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 16]> {
    let mut mac =
        HmacMd5::new_from_slice(key).map_err(|e| AppError::auth(format!("NTLM key: {e}")))?;
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; 16];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn malformed(what: &str) -> AppError {
    AppError::auth(format!("malformed NTLM challenge: {what}"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    const SERVER: [u8; 8] = [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef];
    const CLIENT: [u8; 8] = [0xaa; 8];

    fn account() -> Account<'static> {
        Account::from_qualified("Domain\\User", "Password")
    }

    /// Challenge message with `target_info` placed after the header.
    pub(crate) fn challenge_message(target_info: &[u8]) -> Vec<u8> {
        let mut msg = Vec::new();
        msg.extend_from_slice(SIGNATURE);
        msg.extend_from_slice(&CHALLENGE.to_le_bytes());
        msg.extend_from_slice(&[0u8; 8]);
        msg.extend_from_slice(&CLIENT_FLAGS.to_le_bytes());
        msg.extend_from_slice(&SERVER);
        msg.extend_from_slice(&[0u8; 8]);
        let len = target_info.len() as u16;
        msg.extend_from_slice(&len.to_le_bytes());
        msg.extend_from_slice(&len.to_le_bytes());
        msg.extend_from_slice(&(CHALLENGE_HEADER_LEN as u32).to_le_bytes());
        msg.extend_from_slice(target_info);
        msg
    }

    fn timestamp_av(filetime: u64) -> Vec<u8> {
        let mut av = Vec::new();
        av.extend_from_slice(&AV_TIMESTAMP.to_le_bytes());
        av.extend_from_slice(&8u16.to_le_bytes());
        av.extend_from_slice(&filetime.to_le_bytes());
        av.extend_from_slice(&[0u8; 4]);
        av
    }

    #[test]
    fn test_nt_hash() {
        assert_eq!(hex::encode(nt_hash("Password")), "a4f49c406510bdcab6824ee7c30fd852");
    }

    #[test]
    fn test_ntowf_v2() {
        assert_eq!(
            hex::encode(ntowf_v2(&account()).unwrap()),
            "0c868a403bfd7a93a3001ef22ef02e3f"
        );
    }

    #[test]
    fn test_lmv2_response() {
        let key = ntowf_v2(&account()).unwrap();
        assert_eq!(
            hex::encode(lmv2_response(&key, &SERVER, &CLIENT).unwrap()),
            "86c35097ac9cec102554764a57cccc19aaaaaaaaaaaaaaaa"
        );
    }

    #[test]
    fn test_account_split() {
        let qualified = Account::from_qualified("GUC\\student", "pw");
        assert_eq!((qualified.domain, qualified.user), ("GUC", "student"));

        let bare = Account::from_qualified("student", "pw");
        assert_eq!((bare.domain, bare.user), ("", "student"));
    }

    #[test]
    fn test_negotiate_message_layout() {
        let msg = negotiate_message();
        assert_eq!(msg.len(), 32);
        assert_eq!(&msg[..8], SIGNATURE);
        assert_eq!(read_u32(&msg, 8), NEGOTIATE);
        assert!(authorization(&msg).starts_with("NTLM TlRMTVNTUAABAAAA"));
    }

    #[test]
    fn test_parse_challenge_with_timestamp() {
        let challenge = Challenge::parse(&challenge_message(&timestamp_av(42))).unwrap();

        assert_eq!(challenge.server_challenge, SERVER);
        assert_eq!(challenge.flags, CLIENT_FLAGS);
        assert_eq!(challenge.timestamp(), Some(42));
    }

    #[test]
    fn test_parse_rejects_bad_messages() {
        assert!(Challenge::parse(b"short").is_err());
        assert!(Challenge::parse(&negotiate_message()).is_err());

        let mut truncated = challenge_message(&timestamp_av(1));
        truncated.truncate(CHALLENGE_HEADER_LEN + 4);
        assert!(Challenge::parse(&truncated).is_err());
    }

    #[test]
    fn test_authenticate_message_fields() {
        let target_info = timestamp_av(7);
        let challenge = Challenge::parse(&challenge_message(&target_info)).unwrap();
        let msg = authenticate_message(&account(), &challenge, CLIENT, 7).unwrap();

        assert_eq!(&msg[..8], SIGNATURE);
        assert_eq!(read_u32(&msg, 8), AUTHENTICATE);

        let field = |at: usize| {
            let len = usize::from(read_u16(&msg, at));
            let offset = read_u32(&msg, at + 4) as usize;
            msg[offset..offset + len].to_vec()
        };
        assert_eq!(field(12).len(), 24);
        assert_eq!(field(20).len(), 16 + 32 + target_info.len());
        assert_eq!(field(28), utf16le("Domain"));
        assert_eq!(field(36), utf16le("User"));
        assert!(field(44).is_empty());
        assert!(authorization(&msg).starts_with("NTLM TlRMTVNTUAADAAAA"));
    }

    #[test]
    fn test_challenge_header_parsing() {
        let msg = challenge_message(&[]);
        let header = format!("NTLM {}", BASE64.encode(&msg));

        assert!(offers_ntlm("NTLM"));
        assert!(offers_ntlm(&header));
        assert!(!offers_ntlm("Negotiate"));
        assert_eq!(challenge_token(&header), Some(msg));
        assert_eq!(challenge_token("NTLM"), None);
        assert_eq!(challenge_token("Basic realm=\"x\""), None);
    }
}
