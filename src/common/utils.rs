//! 共通ユーティリティ（パーセントデコード、クエリ解析、値の検証、環境変数）

use std::collections::HashMap;
use std::env;

use log::warn;

use crate::error::Error;

/// アップロード全体の既定上限（5MB）
const DEFAULT_MAX_BODY_SIZE: usize = 5 * 1024 * 1024;

/// パーセントエンコーディングを戻す（`+` はスペース）
///
/// 不完全なエスケープはそのまま残し、UTF-8として不正なバイト列は置換文字になる。
pub fn percent_decode(input: &str) -> String {
    let mut decoded = Vec::with_capacity(input.len());
    let mut bytes = input.as_bytes().iter();
    while let Some(&byte) = bytes.next() {
        match byte {
            b'+' => decoded.push(b' '),
            b'%' => {
                let rest = bytes.as_slice();
                match rest
                    .get(..2)
                    .filter(|hex| hex.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|hex| std::str::from_utf8(hex).ok())
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                {
                    Some(value) => {
                        decoded.push(value);
                        bytes.nth(1);
                    }
                    None => decoded.push(b'%'),
                }
            }
            other => decoded.push(other),
        }
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

/// `a=1&b=2` 形式のクエリ文字列をデコードしてマップにする（空のキーは捨てる）
pub fn parse_query_string(query_string: &str) -> HashMap<String, String> {
    query_string
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (!key.is_empty()).then(|| (percent_decode(key), percent_decode(value)))
        })
        .collect()
}

/// アップロード全体の最大サイズ（`MVCBRIDGE_MAX_BODY_SIZE`、既定 5MB）
pub fn get_max_body_size() -> usize {
    env_usize("MVCBRIDGE_MAX_BODY_SIZE").unwrap_or(DEFAULT_MAX_BODY_SIZE)
}

/// 数値の環境変数を読む（未設定・不正値は `None`）
pub fn env_usize(name: &str) -> Option<usize> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring invalid value for {}: {:?} ({})", name, raw, e);
            None
        }
    }
}

/// ヘッダー値として安全か（制御文字とCR/LFを拒否）
pub fn is_header_value_valid(value: &str) -> bool {
    !value.chars().any(|c| c.is_control())
}

// RFC 6265 の token
fn is_cookie_name_valid(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
        })
}

// RFC 6265 の cookie-octet（空白、`"`、`,`、`;`、`\` を除く可視ASCII）
fn is_cookie_value_valid(value: &str) -> bool {
    value
        .bytes()
        .all(|b| b.is_ascii_graphic() && !matches!(b, b'"' | b',' | b';' | b'\\'))
}

/// クッキーの名前と値を検証
pub fn validate_cookie_pair(name: &str, value: &str) -> Result<(), Error> {
    if !is_cookie_name_valid(name) {
        return Err(Error::InvalidCookie(format!("invalid cookie name {:?}", name)));
    }
    if !is_cookie_value_valid(value) {
        return Err(Error::InvalidCookie(format!("invalid value for cookie '{}'", name)));
    }
    Ok(())
}
