//! Output decoding for child process output
//!
//! The measurement binary and the auxiliary shell tools write in whatever
//! encoding the host shell happens to use. PowerShell in particular switches to
//! UTF-16LE when its output is piped. Decoding therefore never fails: it tries a
//! short list of encodings and falls back to lossy UTF-8.
//!
//! The legacy code page follows the host: Windows consoles default to the OEM
//! page 850, other hosts get Windows-1252.

use std::sync::LazyLock;

/// Code page 850 characters for bytes 0x80..=0xFF
static CP850_HIGH: LazyLock<Vec<char>> = LazyLock::new(|| {
    "ÇüéâäàåçêëèïîìÄÅÉæÆôöòûùÿÖÜø£Ø×ƒáíóúñÑªº¿®¬½¼¡«»░▒▓│┤ÁÂÀ©╣║╗╝¢¥┐\
     └┴┬├─┼ãÃ╚╔╩╦╠═╬¤ðÐÊËÈıÍÎÏ┘┌█▄¦Ì▀ÓßÔÒõÕµþÞÚÛÙýÝ¯´\u{AD}±‗¾¶§÷¸°¨·¹³²■\u{A0}"
        .chars()
        .collect()
});

/// Windows-1252 code points for bytes 0x80..=0x9F; `None` marks undefined slots
const CP1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'),
    None,
    Some('\u{201A}'),
    Some('\u{0192}'),
    Some('\u{201E}'),
    Some('\u{2026}'),
    Some('\u{2020}'),
    Some('\u{2021}'),
    Some('\u{02C6}'),
    Some('\u{2030}'),
    Some('\u{0160}'),
    Some('\u{2039}'),
    Some('\u{0152}'),
    None,
    Some('\u{017D}'),
    None,
    None,
    Some('\u{2018}'),
    Some('\u{2019}'),
    Some('\u{201C}'),
    Some('\u{201D}'),
    Some('\u{2022}'),
    Some('\u{2013}'),
    Some('\u{2014}'),
    Some('\u{02DC}'),
    Some('\u{2122}'),
    Some('\u{0161}'),
    Some('\u{203A}'),
    Some('\u{0153}'),
    None,
    Some('\u{017E}'),
    Some('\u{0178}'),
];

/// Decodes process output into text
///
/// 1. More than a tenth NUL bytes: try UTF-16 (BOM-aware, then little endian)
/// 2. Strict UTF-8
/// 3. Code page 850 on Windows, which accepts every byte
/// 4. Windows-1252 elsewhere
/// 5. Lossy UTF-8 with replacement characters
pub fn decode_output(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }

    let nul_count = bytes.iter().filter(|&&b| b == 0).count();
    if nul_count > bytes.len() / 10 {
        if let Some(text) = decode_utf16_with_bom(bytes) {
            return text;
        }
        if let Some(text) = decode_utf16(bytes, true) {
            return text;
        }
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    if cfg!(windows) {
        return decode_cp850(bytes);
    }

    if let Some(text) = decode_cp1252(bytes) {
        return text;
    }

    String::from_utf8_lossy(bytes).into_owned()
}

/// UTF-16 honouring a leading byte order mark, little endian without one
fn decode_utf16_with_bom(bytes: &[u8]) -> Option<String> {
    match bytes {
        [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, true),
        [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, false),
        _ => decode_utf16(bytes, cfg!(target_endian = "little")),
    }
}

fn decode_utf16(bytes: &[u8], little_endian: bool) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }

    let units = bytes.chunks_exact(2).map(|pair| {
        if little_endian {
            u16::from_le_bytes([pair[0], pair[1]])
        } else {
            u16::from_be_bytes([pair[0], pair[1]])
        }
    });

    char::decode_utf16(units).collect::<Result<String, _>>().ok()
}

fn decode_cp850(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| match b {
            0x80..=0xFF => CP850_HIGH[(b - 0x80) as usize],
            _ => char::from(b),
        })
        .collect()
}

fn decode_cp1252(bytes: &[u8]) -> Option<String> {
    bytes
        .iter()
        .map(|&b| match b {
            0x80..=0x9F => CP1252_HIGH[(b - 0x80) as usize],
            _ => Some(char::from(b)),
        })
        .collect()
}
