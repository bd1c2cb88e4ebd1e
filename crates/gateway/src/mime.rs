//! # MIMEタイプ表
//!
//! - ネイティブドキュメント → エクスポート先MIMEタイプ
//! - ファイル名の拡張子 → アップロード時のMIMEタイプ

/// Googleネイティブ形式のMIMEタイプ接頭辞
const NATIVE_PREFIX: &str = "application/vnd.google-apps.";

/// ネイティブドキュメントとエクスポート先の対応表。
const EXPORT_TYPES: &[(&str, &str)] = &[
    ("application/vnd.google-apps.document", "text/plain"),
    ("application/vnd.google-apps.spreadsheet", "text/csv"),
    ("application/vnd.google-apps.presentation", "text/plain"),
];

/// 拡張子とアップロードMIMEタイプの対応表。
const SUFFIX_TYPES: &[(&str, &str)] = &[
    (".md", "text/markdown"),
    (".json", "application/json"),
    (".csv", "text/csv"),
    (".txt", "text/plain"),
];

/// 表にない拡張子のアップロードMIMEタイプ
pub const DEFAULT_UPLOAD_TYPE: &str = "text/plain";

/// Googleネイティブ形式（Docs/Sheets/Slides/フォルダ等）かどうか。
pub fn is_native_document(mime_type: &str) -> bool {
    mime_type.starts_with(NATIVE_PREFIX)
}

/// ネイティブドキュメントのエクスポート先MIMEタイプ。表にない形式は `None`。
pub fn export_type_for(mime_type: &str) -> Option<&'static str> {
    EXPORT_TYPES
        .iter()
        .find(|(native, _)| *native == mime_type)
        .map(|(_, export)| *export)
}

/// ファイル名からアップロード時のMIMEタイプを推定する（大文字小文字を区別しない）。
pub fn upload_type_for(filename: &str) -> &'static str {
    let lower = filename.to_ascii_lowercase();
    SUFFIX_TYPES
        .iter()
        .find(|(suffix, _)| lower.ends_with(suffix))
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_UPLOAD_TYPE)
}
