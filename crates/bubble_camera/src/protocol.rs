//! Bubble wire protocol frames.
//!
//! The camera expects three outbound frames and never acknowledges any of them:
//! ```text
//! GET /bubble/live?... HTTP/1.1   (request line + headers)
//! auth frame                      (20-byte header + user[16] + pass[16])
//! start frame                     (27 constant bytes)
//! ```
//! Everything received afterwards is a raw H264 Annex-B byte stream.

/// Default HTTP port the Bubble endpoint listens on
pub const DEFAULT_PORT: u16 = 80;

/// Width of each zero-padded credential field
pub const CREDENTIAL_FIELD_LEN: usize = 16;

/// Fixed header of the auth frame
pub const AUTH_HEADER: [u8; 20] = [
    0xaa, 0x00, 0x00, 0x00, 0x35, 0x00, 0x00, 0xe6, 0x36, 0xb1, 0x00, 0x00, 0x00, 0x2c, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Total size of the auth frame
pub const AUTH_BLOB_LEN: usize = AUTH_HEADER.len() + 2 * CREDENTIAL_FIELD_LEN;

/// Constant frame that starts the elementary stream
pub const START_BLOB: [u8; 27] = [
    0xaa, 0x00, 0x00, 0x00, 0x15, 0x0a, 0x00, 0xe6, 0x37, 0x1e, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Annex-B start code delimiting NAL units
pub const NAL_START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Camera login used to build the auth frame
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Encode into the 52-byte auth frame.
    ///
    /// Each field is truncated to 16 characters and right-padded with zeros.
    /// Every character becomes one byte (its low 8 bits), so non-ASCII input
    /// is never split mid-character.
    pub fn auth_blob(&self) -> [u8; AUTH_BLOB_LEN] {
        let mut blob = [0u8; AUTH_BLOB_LEN];
        let (header, fields) = blob.split_at_mut(AUTH_HEADER.len());
        let (user, pass) = fields.split_at_mut(CREDENTIAL_FIELD_LEN);

        header.copy_from_slice(&AUTH_HEADER);
        encode_field(user, &self.username);
        encode_field(pass, &self.password);
        blob
    }
}

// Never print the password
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn encode_field(field: &mut [u8], value: &str) {
    for (slot, ch) in field.iter_mut().zip(value.chars()) {
        *slot = (u32::from(ch) & 0xff) as u8;
    }
}

/// Build the HTTP-style request that selects channel and stream
pub fn request_line(host: &str, channel: u32, stream: u32) -> String {
    format!(
        "GET /bubble/live?ch={channel}&stream={stream}&av=1 HTTP/1.1\r\n\
         Host: {host}\r\n\
         Connection: keep-alive\r\n\r\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_blob_layout() {
        let blob = Credentials::new("admin", "secret").auth_blob();
        assert_eq!(blob.len(), 52);
        assert_eq!(&blob[..20], &AUTH_HEADER);
        assert_eq!(&blob[20..25], b"admin");
        assert!(blob[25..36].iter().all(|b| *b == 0));
        assert_eq!(&blob[36..42], b"secret");
        assert!(blob[42..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_auth_blob_length_for_short_fields() {
        for len in 0..=CREDENTIAL_FIELD_LEN {
            let value = "x".repeat(len);
            let blob = Credentials::new(value.clone(), value).auth_blob();
            assert_eq!(blob.len(), AUTH_BLOB_LEN);
            assert_eq!(blob[20..20 + len].iter().filter(|b| **b == b'x').count(), len);
        }
    }

    #[test]
    fn test_auth_blob_truncates_long_fields() {
        let blob = Credentials::new("abcdefghijklmnopqrstuvwxyz", "0123456789ABCDEFGHIJ").auth_blob();
        assert_eq!(blob.len(), 52);
        assert_eq!(&blob[20..36], b"abcdefghijklmnop");
        assert_eq!(&blob[36..52], b"0123456789ABCDEF");
    }

    #[test]
    fn test_auth_blob_one_byte_per_char() {
        // 17 characters, 18 UTF-8 bytes
        let blob = Credentials::new("ädministratorxyzw", "pässwort").auth_blob();
        assert_eq!(blob.len(), 52);
        assert_eq!(blob[20], 0xe4);
        assert_eq!(&blob[21..36], b"dministratorxyz");
        assert_eq!(&blob[36..44], &[b'p', 0xe4, b's', b's', b'w', b'o', b'r', b't']);
        assert!(blob[44..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_auth_blob_empty_fields_are_zero() {
        let blob = Credentials::new("", "").auth_blob();
        assert!(blob[20..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_auth_header_hex() {
        assert_eq!(
            hex::encode(AUTH_HEADER),
            "aa000000350000e636b10000002c000000000000"
        );
        assert_eq!(
            hex::encode(START_BLOB),
            "aa000000150a00e6371e0000000000000000010000000000000000"
        );
    }

    #[test]
    fn test_request_line() {
        assert_eq!(
            request_line("192.168.1.20", 1, 0),
            "GET /bubble/live?ch=1&stream=0&av=1 HTTP/1.1\r\n\
             Host: 192.168.1.20\r\n\
             Connection: keep-alive\r\n\r\n"
        );
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let dbg = format!("{:?}", Credentials::new("admin", "hunter2"));
        assert!(dbg.contains("admin"));
        assert!(!dbg.contains("hunter2"));
    }
}
