/// File categorization by extension.
///
/// A [`CategoryTable`] is an ordered list of named categories, each owning a set
/// of lowercase extensions written with their leading dot. One synthetic
/// catch-all category, [`CATCH_ALL`], owns no extensions and is returned only
/// when nothing else matches.
///
/// # Examples
///
/// ```
/// use dirsort::file_category::{classify, CategoryTable};
///
/// let table = CategoryTable::default();
/// assert_eq!(classify("report.PDF", &table), "Documents");
/// assert_eq!(classify("holiday.jpeg", &table), "Images");
/// assert_eq!(classify("README", &table), "Others");
/// ```
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;

/// Name of the catch-all category.
pub const CATCH_ALL: &str = "Others";

/// A named bucket of file extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    name: String,
    /// Kept in configuration order so the table serializes back unchanged.
    extensions: Vec<String>,
    lookup: HashSet<String>,
}

impl Category {
    /// Creates a category. Extensions are lowercased and given a leading dot.
    pub fn new<I, S>(name: impl Into<String>, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ordered = Vec::new();
        let mut lookup = HashSet::new();
        for ext in extensions {
            let ext = normalize_extension(ext.as_ref());
            if !ext.is_empty() && lookup.insert(ext.clone()) {
                ordered.push(ext);
            }
        }
        Self {
            name: name.into(),
            extensions: ordered,
            lookup,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// `ext` must already be in normalized form (`.pdf`).
    pub fn contains(&self, ext: &str) -> bool {
        self.lookup.contains(ext)
    }
}

/// Ordered category table with exactly one catch-all entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTable {
    categories: Vec<Category>,
}

impl CategoryTable {
    /// Builds a table from `(name, extensions)` pairs, in order.
    ///
    /// Any entry named [`CATCH_ALL`] is dropped and the catch-all is re-added
    /// last with no extensions, so there is always exactly one.
    pub fn new(categories: impl IntoIterator<Item = Category>) -> Self {
        let mut categories: Vec<Category> = categories
            .into_iter()
            .filter(|c| c.name != CATCH_ALL)
            .collect();
        categories.push(Category::new(CATCH_ALL, Vec::<String>::new()));
        Self { categories }
    }

    /// Appends a category just before the catch-all.
    pub fn push(&mut self, category: Category) {
        if category.name == CATCH_ALL {
            return;
        }
        let at = self.categories.len() - 1;
        self.categories.insert(at, category);
    }

    /// Categories in iteration order, catch-all included (last).
    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn is_catch_all(&self, name: &str) -> bool {
        name == CATCH_ALL
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Name of the first category whose extension set contains `ext`.
    ///
    /// `ext` is the normalized extension (`.jpg`) or an empty string.
    pub fn category_for_extension(&self, ext: &str) -> &str {
        if ext.is_empty() {
            return CATCH_ALL;
        }
        self.categories
            .iter()
            .find(|c| c.contains(ext))
            .map(|c| c.name.as_str())
            .unwrap_or(CATCH_ALL)
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self::new([
            Category::new(
                "Documents",
                [
                    ".pdf", ".doc", ".docx", ".txt", ".rtf", ".odt", ".xls", ".xlsx", ".ppt",
                    ".pptx", ".csv",
                ],
            ),
            Category::new(
                "Images",
                [".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff", ".webp"],
            ),
            Category::new("Videos", [".mp4", ".mkv", ".flv", ".avi", ".mov", ".wmv"]),
            Category::new("Audio", [".mp3", ".wav", ".aac", ".flac", ".ogg"]),
            Category::new("Archives", [".zip", ".rar", ".7z", ".tar", ".gz"]),
            Category::new("Executables", [".exe", ".msi", ".dmg", ".appimage"]),
            Category::new(
                "Code",
                [".py", ".java", ".c", ".cpp", ".html", ".css", ".js", ".php"],
            ),
        ])
    }
}

impl Serialize for CategoryTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.categories.len()))?;
        for category in &self.categories {
            map.serialize_entry(&category.name, &category.extensions)?;
        }
        map.end()
    }
}

struct CategoryTableVisitor;

impl<'de> Visitor<'de> for CategoryTableVisitor {
    type Value = CategoryTable;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object mapping category names to extension lists")
    }

    // Entries are visited in document order, which becomes the match order.
    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut categories = Vec::new();
        while let Some((name, extensions)) = access.next_entry::<String, Vec<String>>()? {
            categories.push(Category::new(name, extensions));
        }
        Ok(CategoryTable::new(categories))
    }
}

impl<'de> Deserialize<'de> for CategoryTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(CategoryTableVisitor)
    }
}

/// Lowercases an extension and makes sure it starts with a dot.
fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.is_empty() || ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}

/// Extension of a file name: the text after the last `.`, lowercased, with its
/// leading dot. Empty if the name has no dot or ends with one.
pub fn extension_of(filename: &str) -> String {
    match filename.rfind('.') {
        Some(idx) if idx + 1 < filename.len() => filename[idx..].to_lowercase(),
        _ => String::new(),
    }
}

/// Maps a file name to its category name. Never touches the filesystem.
pub fn classify<'t>(filename: &str, table: &'t CategoryTable) -> &'t str {
    table.category_for_extension(&extension_of(filename))
}
