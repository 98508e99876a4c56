//! Defines the binary layout of [`NdArray`] blobs.
//!
//! Blobs use the NPY format, version 1.0, so a cell pulled out of a table can be handed
//! to `numpy.load` as-is.
//!
//! Layout: `[ Magic (6) ] [ Version (2) ] [ HeaderLen (u16 LE) ] [ Header ] [ Data ]`
//!
//! The header is a Python dict literal such as
//! `{'descr': '<i8', 'fortran_order': False, 'shape': (2, 3), }`, padded with spaces and
//! terminated by `\n` so the data section starts on a 64-byte boundary. Data is the
//! flat, C-ordered element bytes.
//!
//! Writing always produces little-endian v1.0 (or v2.0 when the header outgrows a `u16`).
//! Reading also accepts v2.0/v3.0 and big-endian or native byte order.

use crate::error::CodecError;
use crate::ndarray::{DType, NdArray, NdData, element_count};

/// Magic bytes opening every blob: `\x93NUMPY`.
pub const MAGIC_BYTES: [u8; 6] = *b"\x93NUMPY";

/// Version written by the encoder.
pub const VERSION: (u8, u8) = (1, 0);

/// Magic(6) + Version(2) + HeaderLen(2)
pub const PREAMBLE_SIZE_V1: usize = 10;

/// Magic(6) + Version(2) + HeaderLen(4)
pub const PREAMBLE_SIZE_V2: usize = 12;

/// The data section starts at a multiple of this.
pub const HEADER_ALIGNMENT: usize = 64;

/// Byte order marker of a dtype descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// `<`
    Little,
    /// `>`
    Big,
    /// `=`
    Native,
    /// `|`, used for single-byte types.
    NotApplicable,
}

impl ByteOrder {
    fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            b'<' => Some(Self::Little),
            b'>' => Some(Self::Big),
            b'=' => Some(Self::Native),
            b'|' => Some(Self::NotApplicable),
            _ => None,
        }
    }

    fn is_big_endian(self) -> bool {
        match self {
            Self::Big => true,
            Self::Native => cfg!(target_endian = "big"),
            Self::Little | Self::NotApplicable => false,
        }
    }
}

/// A parsed `descr` entry, e.g. `<f4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descr {
    /// Element type.
    pub dtype: DType,
    /// Byte order of the data section.
    pub byte_order: ByteOrder,
}

impl Descr {
    /// The descriptor the encoder writes for `dtype`.
    pub fn little_endian(dtype: DType) -> Self {
        let byte_order = if dtype.item_size() == 1 {
            ByteOrder::NotApplicable
        } else {
            ByteOrder::Little
        };
        Self { dtype, byte_order }
    }

    /// Parses a descriptor string.
    pub fn parse(text: &str) -> Result<Self, CodecError> {
        let bytes = text.as_bytes();
        let unsupported = || CodecError::new(format!("unsupported dtype descriptor '{text}'"));
        let (&marker, code) = bytes.split_first().ok_or_else(unsupported)?;
        let byte_order = ByteOrder::from_marker(marker).ok_or_else(unsupported)?;
        let dtype = match code {
            b"b1" | b"?" => DType::Bool,
            b"i1" => DType::I8,
            b"i2" => DType::I16,
            b"i4" => DType::I32,
            b"i8" => DType::I64,
            b"u1" => DType::U8,
            b"u2" => DType::U16,
            b"u4" => DType::U32,
            b"u8" => DType::U64,
            b"f4" => DType::F32,
            b"f8" => DType::F64,
            _ => return Err(unsupported()),
        };
        Ok(Self { dtype, byte_order })
    }

    fn to_descr_string(self) -> String {
        let marker = match self.byte_order {
            ByteOrder::Little => '<',
            ByteOrder::Big => '>',
            ByteOrder::Native => '=',
            ByteOrder::NotApplicable => '|',
        };
        let code = match self.dtype {
            DType::Bool => "b1",
            DType::I8 => "i1",
            DType::I16 => "i2",
            DType::I32 => "i4",
            DType::I64 => "i8",
            DType::U8 => "u1",
            DType::U16 => "u2",
            DType::U32 => "u4",
            DType::U64 => "u8",
            DType::F32 => "f4",
            DType::F64 => "f8",
        };
        format!("{marker}{code}")
    }
}

/// The dict header preceding the data section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpyHeader {
    /// Element descriptor.
    pub descr: Descr,
    /// Column-major data. Never written, rejected on read.
    pub fortran_order: bool,
    /// Dimensions.
    pub shape: Vec<usize>,
}

impl NpyHeader {
    /// Serializes the preamble (magic, version, length and padded dict).
    pub fn to_bytes(&self) -> Vec<u8> {
        let shape = match self.shape.as_slice() {
            [] => "()".to_string(),
            [single] => format!("({single},)"),
            dims => {
                let inner: Vec<String> = dims.iter().map(usize::to_string).collect();
                format!("({})", inner.join(", "))
            }
        };
        let fortran = if self.fortran_order { "True" } else { "False" };
        let mut dict = format!(
            "{{'descr': '{}', 'fortran_order': {fortran}, 'shape': {shape}, }}",
            self.descr.to_descr_string()
        );

        // Dict plus the trailing newline must fit a u16 for v1.0.
        let (version, preamble) = if dict.len() + HEADER_ALIGNMENT < usize::from(u16::MAX) {
            (VERSION, PREAMBLE_SIZE_V1)
        } else {
            ((2, 0), PREAMBLE_SIZE_V2)
        };
        let unpadded = preamble + dict.len() + 1;
        let padding = (HEADER_ALIGNMENT - unpadded % HEADER_ALIGNMENT) % HEADER_ALIGNMENT;
        dict.extend(std::iter::repeat_n(' ', padding));
        dict.push('\n');

        let mut buf = Vec::with_capacity(preamble + dict.len());
        buf.extend_from_slice(&MAGIC_BYTES);
        buf.push(version.0);
        buf.push(version.1);
        if preamble == PREAMBLE_SIZE_V1 {
            // Guarded by the version choice above.
            let len = u16::try_from(dict.len()).unwrap_or(u16::MAX);
            buf.extend_from_slice(&len.to_le_bytes());
        } else {
            let len = u32::try_from(dict.len()).unwrap_or(u32::MAX);
            buf.extend_from_slice(&len.to_le_bytes());
        }
        buf.extend_from_slice(dict.as_bytes());
        buf
    }

    /// Parses the preamble, returning the header and the offset of the data section.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), CodecError> {
        if bytes.len() < PREAMBLE_SIZE_V1 || bytes[..6] != MAGIC_BYTES {
            return Err(CodecError::new("not an NPY blob: bad magic bytes"));
        }
        let (header_len, start) = match bytes[6] {
            1 => (usize::from(u16::from_le_bytes([bytes[8], bytes[9]])), PREAMBLE_SIZE_V1),
            2 | 3 => {
                let len_bytes: [u8; 4] = bytes
                    .get(8..12)
                    .and_then(|s| s.try_into().ok())
                    .ok_or_else(|| CodecError::new("truncated NPY preamble"))?;
                let len = usize::try_from(u32::from_le_bytes(len_bytes))
                    .map_err(|_| CodecError::new("NPY header length overflows"))?;
                (len, PREAMBLE_SIZE_V2)
            }
            major => {
                return Err(CodecError::new(format!(
                    "unsupported NPY version {major}.{}",
                    bytes[7]
                )));
            }
        };
        let end = start
            .checked_add(header_len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| CodecError::new("truncated NPY header"))?;
        let text = std::str::from_utf8(&bytes[start..end])
            .map_err(|_| CodecError::new("NPY header is not valid text"))?;

        let mut descr = None;
        let mut fortran_order = None;
        let mut shape = None;
        for (key, value) in DictParser::new(text).parse()? {
            match (key.as_str(), value) {
                ("descr", HeaderValue::Str(s)) => descr = Some(Descr::parse(&s)?),
                ("fortran_order", HeaderValue::Bool(b)) => fortran_order = Some(b),
                ("shape", HeaderValue::Tuple(dims)) => shape = Some(dims),
                (key, _) => {
                    return Err(CodecError::new(format!(
                        "unexpected NPY header entry '{key}'"
                    )));
                }
            }
        }
        let header = Self {
            descr: descr.ok_or_else(|| CodecError::new("NPY header missing 'descr'"))?,
            fortran_order: fortran_order
                .ok_or_else(|| CodecError::new("NPY header missing 'fortran_order'"))?,
            shape: shape.ok_or_else(|| CodecError::new("NPY header missing 'shape'"))?,
        };
        Ok((header, end))
    }
}

/// Encodes an array as a complete NPY blob.
pub fn encode_npy(array: &NdArray) -> Vec<u8> {
    let header = NpyHeader {
        descr: Descr::little_endian(array.dtype()),
        fortran_order: false,
        shape: array.shape().to_vec(),
    };
    let mut buf = header.to_bytes();
    buf.reserve(array.len() * array.dtype().item_size());

    macro_rules! put {
        ($values:expr) => {
            for v in $values {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        };
    }
    match array.data() {
        NdData::Bool(v) => buf.extend(v.iter().map(|b| u8::from(*b))),
        NdData::I8(v) => put!(v),
        NdData::I16(v) => put!(v),
        NdData::I32(v) => put!(v),
        NdData::I64(v) => put!(v),
        NdData::U8(v) => buf.extend_from_slice(v),
        NdData::U16(v) => put!(v),
        NdData::U32(v) => put!(v),
        NdData::U64(v) => put!(v),
        NdData::F32(v) => put!(v),
        NdData::F64(v) => put!(v),
    }
    buf
}

/// Decodes a blob produced by [`encode_npy`] (or by numpy).
pub fn decode_npy(bytes: &[u8]) -> Result<NdArray, CodecError> {
    let (header, offset) = NpyHeader::from_bytes(bytes)?;
    if header.fortran_order {
        return Err(CodecError::new("Fortran-ordered NPY data is not supported"));
    }
    let count = element_count(&header.shape)
        .ok_or_else(|| CodecError::new("NPY shape overflows"))?;
    let item_size = header.descr.dtype.item_size();
    let body = &bytes[offset..];
    let expected = count
        .checked_mul(item_size)
        .ok_or_else(|| CodecError::new("NPY shape overflows"))?;
    if body.len() != expected {
        return Err(CodecError::new(format!(
            "NPY data section holds {} bytes, shape {:?} of {} needs {expected}",
            body.len(),
            header.shape,
            header.descr.dtype
        )));
    }

    let big = header.descr.byte_order.is_big_endian();
    macro_rules! take {
        ($t:ty, $variant:ident) => {{
            const N: usize = std::mem::size_of::<$t>();
            NdData::$variant(
                body.chunks_exact(N)
                    .map(|chunk| {
                        let mut raw = [0u8; N];
                        raw.copy_from_slice(chunk);
                        if big {
                            <$t>::from_be_bytes(raw)
                        } else {
                            <$t>::from_le_bytes(raw)
                        }
                    })
                    .collect(),
            )
        }};
    }
    let data = match header.descr.dtype {
        DType::Bool => NdData::Bool(body.iter().map(|b| *b != 0).collect()),
        DType::I8 => take!(i8, I8),
        DType::I16 => take!(i16, I16),
        DType::I32 => take!(i32, I32),
        DType::I64 => take!(i64, I64),
        DType::U8 => NdData::U8(body.to_vec()),
        DType::U16 => take!(u16, U16),
        DType::U32 => take!(u32, U32),
        DType::U64 => take!(u64, U64),
        DType::F32 => take!(f32, F32),
        DType::F64 => take!(f64, F64),
    };
    NdArray::from_data(header.shape, data).map_err(|e| CodecError::new(e.to_string()))
}

// --- Header dict parsing ---

#[derive(Debug)]
enum HeaderValue {
    Str(String),
    Bool(bool),
    Tuple(Vec<usize>),
}

struct DictParser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> DictParser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            src: text.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, what: &str) -> CodecError {
        CodecError::new(format!("malformed NPY header at byte {}: {what}", self.pos))
    }

    fn skip_ws(&mut self) {
        while self.src.get(self.pos).is_some_and(u8::is_ascii_whitespace) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.src.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<(), CodecError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    fn parse(mut self) -> Result<Vec<(String, HeaderValue)>, CodecError> {
        self.expect(b'{')?;
        let mut entries = Vec::new();
        loop {
            if self.peek() == Some(b'}') {
                self.pos += 1;
                break;
            }
            let key = self.string()?;
            self.expect(b':')?;
            let value = self.value()?;
            entries.push((key, value));
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {}
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
        if self.peek().is_some() {
            return Err(self.error("trailing characters"));
        }
        Ok(entries)
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let quote = match self.peek() {
            Some(q @ (b'\'' | b'"')) => q,
            _ => return Err(self.error("expected a quoted string")),
        };
        self.pos += 1;
        let start = self.pos;
        while self.src.get(self.pos).is_some_and(|b| *b != quote) {
            self.pos += 1;
        }
        if self.pos >= self.src.len() {
            return Err(self.error("unterminated string"));
        }
        let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        self.pos += 1;
        Ok(text)
    }

    fn value(&mut self) -> Result<HeaderValue, CodecError> {
        match self.peek() {
            Some(b'\'' | b'"') => self.string().map(HeaderValue::Str),
            Some(b'(') => self.tuple().map(HeaderValue::Tuple),
            Some(_) if self.src[self.pos..].starts_with(b"True") => {
                self.pos += 4;
                Ok(HeaderValue::Bool(true))
            }
            Some(_) if self.src[self.pos..].starts_with(b"False") => {
                self.pos += 5;
                Ok(HeaderValue::Bool(false))
            }
            _ => Err(self.error("expected a value")),
        }
    }

    fn tuple(&mut self) -> Result<Vec<usize>, CodecError> {
        self.expect(b'(')?;
        let mut dims = Vec::new();
        loop {
            match self.peek() {
                Some(b')') => {
                    self.pos += 1;
                    return Ok(dims);
                }
                Some(b) if b.is_ascii_digit() => {
                    let start = self.pos;
                    while self.src.get(self.pos).is_some_and(u8::is_ascii_digit) {
                        self.pos += 1;
                    }
                    let digits = std::str::from_utf8(&self.src[start..self.pos])
                        .map_err(|_| self.error("invalid dimension"))?;
                    let dim = digits
                        .parse::<usize>()
                        .map_err(|_| self.error("dimension out of range"))?;
                    // Python 2 long suffix.
                    if self.src.get(self.pos) == Some(&b'L') {
                        self.pos += 1;
                    }
                    dims.push(dim);
                    match self.peek() {
                        Some(b',') => self.pos += 1,
                        Some(b')') => {}
                        _ => return Err(self.error("expected ',' or ')'")),
                    }
                }
                _ => return Err(self.error("expected a dimension")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preamble_is_aligned() {
        for shape in [vec![], vec![5], vec![2, 3], vec![100_000, 7, 3, 1]] {
            let header = NpyHeader {
                descr: Descr::little_endian(DType::F64),
                fortran_order: false,
                shape,
            };
            let bytes = header.to_bytes();
            assert_eq!(bytes.len() % HEADER_ALIGNMENT, 0);
            assert_eq!(bytes.last(), Some(&b'\n'));
            assert_eq!(&bytes[..6], &MAGIC_BYTES);
            assert_eq!((bytes[6], bytes[7]), VERSION);
        }
    }

    #[test]
    fn test_header_text_matches_numpy() {
        let header = NpyHeader {
            descr: Descr::little_endian(DType::I64),
            fortran_order: false,
            shape: vec![5],
        };
        let bytes = header.to_bytes();
        let text = std::str::from_utf8(&bytes[PREAMBLE_SIZE_V1..]).unwrap();
        assert!(text.starts_with("{'descr': '<i8', 'fortran_order': False, 'shape': (5,), }"));
    }

    #[test]
    fn test_single_byte_types_have_no_byte_order() {
        assert_eq!(Descr::little_endian(DType::U8).byte_order, ByteOrder::NotApplicable);
        assert_eq!(Descr::little_endian(DType::Bool).to_descr_string(), "|b1");
        assert_eq!(Descr::little_endian(DType::F32).to_descr_string(), "<f4");
    }

    #[test]
    fn test_parse_header_roundtrip() {
        let header = NpyHeader {
            descr: Descr::little_endian(DType::U16),
            fortran_order: false,
            shape: vec![2, 3, 4],
        };
        let bytes = header.to_bytes();
        let (parsed, offset) = NpyHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(offset, bytes.len());
    }

    #[test]
    fn test_decodes_big_endian_data() {
        let header = NpyHeader {
            descr: Descr {
                dtype: DType::I32,
                byte_order: ByteOrder::Big,
            },
            fortran_order: false,
            shape: vec![2],
        };
        let mut bytes = header.to_bytes();
        bytes.extend_from_slice(&1i32.to_be_bytes());
        bytes.extend_from_slice(&(-2i32).to_be_bytes());
        let array = decode_npy(&bytes).unwrap();
        assert_eq!(array.as_slice::<i32>(), Some(&[1, -2][..]));
    }

    #[test]
    fn test_rejects_fortran_order() {
        let header = NpyHeader {
            descr: Descr::little_endian(DType::U8),
            fortran_order: true,
            shape: vec![1],
        };
        let mut bytes = header.to_bytes();
        bytes.push(7);
        let err = decode_npy(&bytes).unwrap_err();
        assert!(err.message().contains("Fortran"));
    }

    #[test]
    fn test_rejects_truncated_data() {
        let array = NdArray::from_vec(vec![1.0f64, 2.0, 3.0]);
        let bytes = encode_npy(&array);
        let err = decode_npy(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(err.message().contains("data section"));
    }

    #[test]
    fn test_rejects_bad_magic() {
        let err = decode_npy(b"\x93NUMPX\x01\x00\x00\x00").unwrap_err();
        assert!(err.message().contains("magic"));
    }
}
