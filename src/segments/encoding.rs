//! Carrier segmentation rules.
//!
//! A message is sent GSM-7 when every character is in the GSM 03.38 basic or
//! extension table, otherwise the whole message falls back to UCS-2.
//!
//! | Encoding | Single segment | Per segment when concatenated |
//! |----------|----------------|-------------------------------|
//! | GSM-7    | 160 septets    | 153 septets                   |
//! | UCS-2    | 70 code units  | 67 code units                 |
//!
//! Extension characters take two septets and a surrogate pair takes two code
//! units; neither is ever split across a segment boundary.

use thiserror::Error;

const GSM7_BASIC: &str = "@£$¥èéùìòÇ\nØø\rÅåΔ_ΦΓΛΩΠΨΣΘΞÆæßÉ !\"#¤%&'()*+,-./0123456789:;<=>?\
¡ABCDEFGHIJKLMNOPQRSTUVWXYZÄÖÑÜ§¿abcdefghijklmnopqrstuvwxyzäöñüà";
const GSM7_EXTENSION: &str = "^{}\\[~]|€\x0c";

const GSM7_SINGLE: usize = 160;
const GSM7_MULTI: usize = 153;
const UCS2_SINGLE: usize = 70;
const UCS2_MULTI: usize = 67;

/// Longest body the provider accepts for one message
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 1600;

#[derive(Debug, Error, PartialEq)]
pub enum SegmentError {
    #[error("message of {length} characters exceeds the provider limit of {max}")]
    MessageTooLong { length: usize, max: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Gsm7,
    Ucs2,
}

/// Converts message bodies into billable segments
pub trait SegmentCalculator: Send + Sync {
    fn count_segments(&self, bodies: &[&str]) -> Result<u32, SegmentError>;
}

/// Default calculator implementing standard carrier packing
#[derive(Debug, Clone)]
pub struct CarrierSegmentCalculator {
    max_message_chars: usize,
}

impl CarrierSegmentCalculator {
    pub fn new() -> Self {
        Self {
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
        }
    }

    pub fn with_max_message_chars(max_message_chars: usize) -> Self {
        Self { max_message_chars }
    }

    /// Segments needed for a single message body
    pub fn segments_for(&self, body: &str) -> Result<u32, SegmentError> {
        if body.is_empty() {
            return Ok(0);
        }

        let length = body.chars().count();
        if length > self.max_message_chars {
            return Err(SegmentError::MessageTooLong {
                length,
                max: self.max_message_chars,
            });
        }

        let segments = match detect_encoding(body) {
            Encoding::Gsm7 => pack(body, gsm7_width, GSM7_SINGLE, GSM7_MULTI),
            Encoding::Ucs2 => pack(body, char::len_utf16, UCS2_SINGLE, UCS2_MULTI),
        };
        Ok(segments)
    }
}

impl Default for CarrierSegmentCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentCalculator for CarrierSegmentCalculator {
    fn count_segments(&self, bodies: &[&str]) -> Result<u32, SegmentError> {
        let mut total = 0u32;
        for body in bodies {
            total = total.saturating_add(self.segments_for(body)?);
        }
        Ok(total)
    }
}

pub fn detect_encoding(body: &str) -> Encoding {
    if body
        .chars()
        .all(|c| GSM7_BASIC.contains(c) || GSM7_EXTENSION.contains(c))
    {
        Encoding::Gsm7
    } else {
        Encoding::Ucs2
    }
}

fn gsm7_width(c: char) -> usize {
    if GSM7_EXTENSION.contains(c) { 2 } else { 1 }
}

fn pack(body: &str, width: fn(char) -> usize, single: usize, multi: usize) -> u32 {
    let total: usize = body.chars().map(width).sum();
    if total <= single {
        return 1;
    }

    let mut segments = 1u32;
    let mut used = 0usize;
    for c in body.chars() {
        let w = width(c);
        if used + w > multi {
            segments += 1;
            used = 0;
        }
        used += w;
    }
    segments
}
