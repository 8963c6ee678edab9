use num_enum::{IntoPrimitive, TryFromPrimitive};

/// A closed set of the character sets/collations this server recognizes.
///
/// All of them are ASCII-compatible byte encodings from the text-codec's
/// point of view, so encoding/decoding goes straight through
/// `String::from_utf8`/`as_bytes`; anything that isn't valid UTF-8 fails
/// with `MysqlError::Encoding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum CharacterSet {
    Latin1SwedishCi = 8,
    Utf8GeneralCi = 33,
    Binary = 63,
    Utf8Mb4GeneralCi = 45,
    Utf8Mb4Unicode520Ci = 224,
    Utf8Mb40900AiCi = 255,
}

impl CharacterSet {
    pub const DEFAULT: CharacterSet = CharacterSet::Utf8Mb4GeneralCi;

    pub fn id(self) -> u16 {
        self.into()
    }

    pub fn decode(self, bytes: &[u8]) -> Result<String, common::err::MysqlError> {
        match self {
            CharacterSet::Binary => Ok(bytes.iter().map(|&b| b as char).collect()),
            _ => String::from_utf8(bytes.to_vec()).map_err(common::err::MysqlError::Encoding),
        }
    }

    pub fn encode(self, text: &str) -> Vec<u8> {
        text.as_bytes().to_vec()
    }
}

impl Default for CharacterSet {
    fn default() -> Self {
        CharacterSet::DEFAULT
    }
}
