//! # 拡張子許可ポリシー
//!
//! アップロード可能なファイル拡張子の許可リストの解決と、
//! 候補名の判定。許可リストが空の場合は常に拒否する
//! （「すべて許可」へのフォールバックはしない）。

use std::collections::HashSet;

/// 組み込みのデフォルト許可リスト。
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 8] =
    ["png", "jpg", "jpeg", "gif", "webp", "bmp", "json", "mp3"];

/// カンマ区切りリストをパースする。小文字化し、先頭のドットを除去する。
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_ascii_lowercase())
        .map(|item| item.trim_start_matches('.').to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// 最初の非空ソースをパースした許可リストを返す。
/// すべて空の場合は組み込みデフォルトを返す。
pub fn resolve_allowed(sources: &[Option<String>]) -> HashSet<String> {
    for source in sources.iter().flatten() {
        let entries = parse_list(source);
        if !entries.is_empty() {
            return entries.into_iter().collect();
        }
    }
    DEFAULT_ALLOWED_EXTENSIONS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// 名前から拡張子を抽出する。最後の `.` 以降を小文字で返す。
/// `.` がない、または末尾が `.` の場合は `None`。
pub fn extract_extension(value: &str) -> Option<String> {
    let normalized = value.trim().to_ascii_lowercase();
    let last = normalized.rfind('.')?;
    if last == normalized.len() - 1 {
        return None;
    }
    Some(normalized[last + 1..].to_string())
}

/// 候補名のいずれかが許可リストに違反するかを判定する。
/// 許可リストが空なら常に `true`（拒否側に倒す）。
/// 拡張子が抽出できない候補も違反として扱う。
pub fn violates(candidates: &[Option<&str>], allow: &HashSet<String>) -> bool {
    if allow.is_empty() {
        return true;
    }
    candidates.iter().flatten().any(|value| {
        match extract_extension(value) {
            Some(ext) => !allow.contains(&ext),
            None => true,
        }
    })
}
