/// Content-type categories used by the offline classifier.
///
/// Maps MIME types (sniffed from file content) and file extensions to broad
/// categories, each with the folder it is filed under.
///
/// # Examples
///
/// ```
/// use llm_organizer::file_category::{Category, FileMapper};
///
/// let mapper = FileMapper::default();
/// assert_eq!(mapper.mime_to_category("image/png"), Some(Category::Images));
/// assert_eq!(mapper.categorize(None, Some("csv")), Category::Data);
/// assert_eq!(mapper.categorize(None, Some("nope")), Category::Other);
/// ```
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Documents,
    Images,
    Videos,
    Audio,
    Code,
    Data,
    Archives,
    Executables,
    Other,
}

impl Category {
    /// Folder suggested for files of this category.
    ///
    /// ```
    /// use llm_organizer::file_category::Category;
    ///
    /// assert_eq!(Category::Images.folder_name(), "Images");
    /// assert_eq!(Category::Other.folder_name(), "Other");
    /// ```
    pub fn folder_name(&self) -> &'static str {
        match self {
            Category::Documents => "Documents",
            Category::Images => "Images",
            Category::Videos => "Videos",
            Category::Audio => "Audio",
            Category::Code => "Code",
            Category::Data => "Data",
            Category::Archives => "Archives",
            Category::Executables => "Executables",
            Category::Other => "Other",
        }
    }

    /// Short lowercase tag attached to classifications.
    pub fn tag(&self) -> &'static str {
        match self {
            Category::Documents => "document",
            Category::Images => "image",
            Category::Videos => "video",
            Category::Audio => "audio",
            Category::Code => "code",
            Category::Data => "data",
            Category::Archives => "archive",
            Category::Executables => "executable",
            Category::Other => "other",
        }
    }
}

const MIME_TABLE: &[(&str, Category)] = &[
    ("image/png", Category::Images),
    ("image/jpeg", Category::Images),
    ("image/gif", Category::Images),
    ("image/webp", Category::Images),
    ("image/bmp", Category::Images),
    ("image/tiff", Category::Images),
    ("image/heif", Category::Images),
    ("image/svg+xml", Category::Images),
    ("audio/mpeg", Category::Audio),
    ("audio/x-wav", Category::Audio),
    ("audio/ogg", Category::Audio),
    ("audio/x-flac", Category::Audio),
    ("audio/aac", Category::Audio),
    ("audio/m4a", Category::Audio),
    ("video/mp4", Category::Videos),
    ("video/quicktime", Category::Videos),
    ("video/x-msvideo", Category::Videos),
    ("video/x-matroska", Category::Videos),
    ("video/webm", Category::Videos),
    ("video/x-flv", Category::Videos),
    ("application/pdf", Category::Documents),
    ("application/rtf", Category::Documents),
    ("application/msword", Category::Documents),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Category::Documents,
    ),
    ("application/vnd.oasis.opendocument.text", Category::Documents),
    ("text/plain", Category::Documents),
    ("application/vnd.ms-excel", Category::Data),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Category::Data,
    ),
    ("application/zip", Category::Archives),
    ("application/vnd.rar", Category::Archives),
    ("application/x-7z-compressed", Category::Archives),
    ("application/x-tar", Category::Archives),
    ("application/gzip", Category::Archives),
    ("application/vnd.microsoft.portable-executable", Category::Executables),
    ("application/x-executable", Category::Executables),
    ("application/x-mach-binary", Category::Executables),
];

const EXTENSION_TABLE: &[(Category, &[&str])] = &[
    (
        Category::Documents,
        &["txt", "md", "doc", "docx", "pdf", "rtf", "odt"],
    ),
    (
        Category::Images,
        &["jpg", "jpeg", "png", "gif", "bmp", "svg", "webp", "heic"],
    ),
    (
        Category::Videos,
        &["mp4", "mov", "avi", "mkv", "wmv", "flv", "webm"],
    ),
    (Category::Audio, &["mp3", "wav", "ogg", "flac", "aac", "m4a"]),
    (
        Category::Code,
        &[
            "py", "js", "ts", "html", "css", "java", "c", "cpp", "h", "go", "rs", "php", "rb",
        ],
    ),
    (
        Category::Data,
        &["json", "csv", "xml", "yaml", "yml", "sql", "xlsx", "xls", "toml"],
    ),
    (Category::Archives, &["zip", "rar", "7z", "tar", "gz", "bz2", "xz"]),
    (Category::Executables, &["exe", "app", "bat", "sh", "msi"]),
];

/// Maps MIME types and file extensions to categories.
#[derive(Debug, Clone)]
pub struct FileMapper {
    mime_map: HashMap<&'static str, Category>,
    extension_map: HashMap<&'static str, Category>,
}

impl FileMapper {
    pub fn new() -> Self {
        let mime_map = MIME_TABLE.iter().copied().collect();
        let extension_map = EXTENSION_TABLE
            .iter()
            .flat_map(|(category, exts)| exts.iter().map(move |ext| (*ext, *category)))
            .collect();
        Self {
            mime_map,
            extension_map,
        }
    }

    pub fn mime_to_category(&self, mime_type: &str) -> Option<Category> {
        self.mime_map.get(mime_type.to_lowercase().as_str()).copied()
    }

    pub fn extension_to_category(&self, extension: &str) -> Option<Category> {
        self.extension_map
            .get(extension.trim_start_matches('.').to_lowercase().as_str())
            .copied()
    }

    /// Categorizes a file, preferring the extension over a sniffed MIME type.
    ///
    /// Plain-text sniffing is weak (a `.py` file sniffs as text), so an
    /// explicit extension mapping wins; the MIME type only decides for files
    /// with unknown or missing extensions.
    pub fn categorize(&self, mime_type: Option<&str>, extension: Option<&str>) -> Category {
        extension
            .and_then(|ext| self.extension_to_category(ext))
            .or_else(|| mime_type.and_then(|mime| self.mime_to_category(mime)))
            .unwrap_or(Category::Other)
    }
}

impl Default for FileMapper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_lookup_is_case_insensitive() {
        let mapper = FileMapper::default();
        assert_eq!(mapper.extension_to_category("PNG"), Some(Category::Images));
        assert_eq!(mapper.extension_to_category(".rs"), Some(Category::Code));
        assert_eq!(mapper.extension_to_category("unknown"), None);
    }

    #[test]
    fn test_extension_beats_mime() {
        let mapper = FileMapper::default();
        assert_eq!(
            mapper.categorize(Some("text/plain"), Some("py")),
            Category::Code
        );
    }

    #[test]
    fn test_mime_used_without_known_extension() {
        let mapper = FileMapper::default();
        assert_eq!(
            mapper.categorize(Some("application/pdf"), Some("bin")),
            Category::Documents
        );
        assert_eq!(mapper.categorize(Some("video/mp4"), None), Category::Videos);
    }

    #[test]
    fn test_every_category_has_distinct_folder() {
        let all = [
            Category::Documents,
            Category::Images,
            Category::Videos,
            Category::Audio,
            Category::Code,
            Category::Data,
            Category::Archives,
            Category::Executables,
            Category::Other,
        ];
        let folders: std::collections::HashSet<_> = all.iter().map(|c| c.folder_name()).collect();
        assert_eq!(folders.len(), all.len());
    }
}
