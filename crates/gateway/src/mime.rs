//! # 保存Content-Typeの導出
//!
//! 拡張子→MIMEの静的テーブル、安全なプレフィックス許可リスト、
//! `application/octet-stream` フォールバックの3段からなる純粋な決定テーブル。

use crate::policy::extract_extension;

/// 拡張子→MIMEの静的テーブル。
pub const SAFE_MIME_BY_EXTENSION: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("json", "application/json"),
    ("mp3", "audio/mpeg"),
];

/// 宣言Content-Typeを信頼してよいプレフィックス。
const SAFE_CONTENT_TYPE_PREFIXES: &[&str] = &["image/", "audio/", "video/", "text/"];

/// 宣言Content-Typeを信頼してよい完全一致の型。
const SAFE_CONTENT_TYPES: &[&str] = &["application/json", "application/octet-stream"];

/// テーブルから拡張子に対応するMIMEを引く。
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    SAFE_MIME_BY_EXTENSION
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, m)| *m)
}

/// 保存するContent-Typeを導出する。
///
/// 候補名（ファイル名・キー）の拡張子でテーブルを引き、ヒットすればそれを使う。
/// ヒットしない場合、宣言された型が安全なプレフィックス・型に一致するときのみ
/// 宣言値を採用し、それ以外は `application/octet-stream` を強制する。
pub fn resolve_content_type(candidates: &[Option<&str>], declared: &str) -> String {
    for candidate in candidates.iter().flatten() {
        if let Some(mime) = extract_extension(candidate).and_then(|e| mime_for_extension(&e)) {
            return mime.to_string();
        }
    }

    let declared = declared.trim().to_ascii_lowercase();
    let safe = SAFE_CONTENT_TYPE_PREFIXES
        .iter()
        .any(|p| declared.starts_with(p))
        || SAFE_CONTENT_TYPES.iter().any(|t| *t == declared);
    if !declared.is_empty() && safe {
        declared
    } else {
        "application/octet-stream".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// テーブルにある拡張子はテーブルの値が勝つことを確認
    #[test]
    fn test_table_hit_wins() {
        assert_eq!(
            resolve_content_type(&[Some("a.png")], "text/plain"),
            "image/png"
        );
        assert_eq!(
            resolve_content_type(&[None, Some("dir/b.mp3")], "application/zip"),
            "audio/mpeg"
        );
    }

    /// テーブル外でも安全なプレフィックスなら宣言値を採用することを確認
    #[test]
    fn test_safe_prefix_fallback() {
        assert_eq!(
            resolve_content_type(&[Some("a.unknown")], "image/tiff"),
            "image/tiff"
        );
        assert_eq!(
            resolve_content_type(&[Some("a.unknown")], "Text/Plain"),
            "text/plain"
        );
        assert_eq!(
            resolve_content_type(&[], "application/json"),
            "application/json"
        );
    }

    /// 安全でない宣言値はoctet-streamに強制されることを確認
    #[test]
    fn test_unsafe_forces_octet_stream() {
        assert_eq!(
            resolve_content_type(&[Some("a.unknown")], "application/x-sh"),
            "application/octet-stream"
        );
        assert_eq!(
            resolve_content_type(&[], ""),
            "application/octet-stream"
        );
    }
}
