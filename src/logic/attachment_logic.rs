//! 添付ファイル抽出・印刷判定のビジネスロジック
//!
//! Gmail API やファイルシステムにアクセスしない純粋な関数のみを提供します。

use crate::gmail::MessagePart;

/// ファイル名として使えない文字（Windows の予約文字を含む）
const INVALID_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Windows の予約デバイス名（拡張子を付けても予約扱い）
const RESERVED_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// ファイル名を持つパートをすべて集める
///
/// ルートパートから作業リストで木構造をたどる（深さ優先）。
/// 子パートは逆順に積むため、結果はメール内の出現順になる。
/// ファイル名が空、または本文（インラインデータ・添付ファイル参照）が無いパートは含まない。
///
/// # Examples
/// ```
/// use vvf_fax_lib::gmail::{MessagePart, PartBody};
/// use vvf_fax_lib::logic::attachment_logic::collect_attachment_parts;
///
/// let root = MessagePart {
///     parts: vec![MessagePart {
///         filename: Some("fax.pdf".to_string()),
///         body: Some(PartBody {
///             attachment_id: Some("att-1".to_string()),
///             ..Default::default()
///         }),
///         ..Default::default()
///     }],
///     ..Default::default()
/// };
/// let parts = collect_attachment_parts(&root);
/// assert_eq!(parts.len(), 1);
/// assert_eq!(parts[0].filename(), Some("fax.pdf"));
/// ```
pub fn collect_attachment_parts(root: &MessagePart) -> Vec<&MessagePart> {
    let mut found = Vec::new();
    let mut worklist = vec![root];

    while let Some(part) = worklist.pop() {
        worklist.extend(part.parts.iter().rev());

        if part.filename().is_none() {
            continue;
        }

        let has_content = part.body.as_ref().is_some_and(|body| {
            body.attachment_id.is_some() || body.data.as_ref().is_some_and(|d| !d.is_empty())
        });
        if has_content {
            found.push(part);
        } else {
            log::debug!(
                "Skipping part {:?}: filename present but no data or attachment reference",
                part.part_id
            );
        }
    }

    found
}

/// 保存用にファイル名を無害化する
///
/// パス区切り（`/` と `\`）より前を捨てて最後の要素だけを使い、制御文字と
/// ファイル名に使えない文字を `_` に置き換える。`.`、`..`、空文字列は None。
/// `CON.pdf` のような予約デバイス名には先頭に `_` を付ける。
pub fn sanitize_filename(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_control() || INVALID_FILENAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();
    // Windows では末尾のドット・空白が無視されるため取り除く
    let cleaned = cleaned.trim().trim_end_matches('.').to_string();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return None;
    }
    if is_reserved_device_name(&cleaned) {
        return Some(format!("_{cleaned}"));
    }
    Some(cleaned)
}

fn is_reserved_device_name(filename: &str) -> bool {
    let stem = filename.split('.').next().unwrap_or(filename).trim_end();
    RESERVED_DEVICE_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(stem))
}

/// 小文字の拡張子を返す（拡張子が無い場合は None）
pub fn file_extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// 拡張子が許可リストに含まれるか（大文字小文字を区別しない）
pub fn is_printable(filename: &str, allowed_extensions: &[String]) -> bool {
    file_extension(filename).is_some_and(|ext| {
        allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&ext))
    })
}
