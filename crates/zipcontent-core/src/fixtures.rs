//! Test fixtures: a content directory holding a known zip archive.
//!
//! Available to this crate's tests and, with the `fixtures` feature, to
//! dependent crates.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::placeholder::PLACEHOLDER_TOKEN;
use crate::storage::ContentStorage;

/// A temporary content directory with one archive in sharded layout.
///
/// The directory is removed when the fixture is dropped.
pub struct ArchiveFixture {
    dir: TempDir,
    filename: String,
}

impl ArchiveFixture {
    /// Filename of the standard archive.
    pub const FILENAME: &'static str = "ab12cd34ef.zip";
    /// `index.html`
    pub const INDEX_HTML: &'static str = "<html><body>root</body></html>";
    /// `sub/index.html`
    pub const SUB_INDEX_HTML: &'static str = "<html><body>sub</body></html>";
    /// `js/app.js`
    pub const APP_JS: &'static str = "console.log('app');\n";
    /// `css/style.css`
    pub const STYLE_CSS: &'static str = "body { color: #333; }\n";

    /// Builds the standard archive:
    ///
    /// | member | notes |
    /// |---|---|
    /// | `index.html`, `sub/index.html` | directory indexes |
    /// | `js/app.js`, `css/style.css` | static assets |
    /// | `data/exercise.json` | contains the placeholder token twice |
    /// | `data/plain.json` | no placeholder |
    /// | `empty.txt` | zero bytes |
    /// | `media/large.bin` | deflated, spans many chunks |
    /// | `README`, `blob.unknownext` | unclassifiable |
    #[must_use]
    pub fn standard() -> Self {
        let members: Vec<(&str, Vec<u8>)> = vec![
            ("index.html", Self::INDEX_HTML.into()),
            ("sub/index.html", Self::SUB_INDEX_HTML.into()),
            ("js/app.js", Self::APP_JS.into()),
            ("css/style.css", Self::STYLE_CSS.into()),
            ("data/exercise.json", Self::exercise_json().into_bytes()),
            ("data/plain.json", br#"{"plain": true}"#.to_vec()),
            ("empty.txt", Vec::new()),
            ("media/large.bin", Self::large_bin()),
            ("README", b"readme".to_vec()),
            ("blob.unknownext", b"blob".to_vec()),
        ];
        Self::with_members(Self::FILENAME, &members)
    }

    /// Builds a fixture whose archive holds exactly `members`.
    #[must_use]
    pub fn with_members(filename: &str, members: &[(&str, Vec<u8>)]) -> Self {
        let fixture = Self {
            dir: TempDir::new().unwrap(),
            filename: filename.to_string(),
        };

        let path = fixture.sharded_path(filename);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut zip = ZipWriter::new(fs::File::create(&path).unwrap());
        for (name, content) in members {
            let method = if name.ends_with(".bin") {
                CompressionMethod::Deflated
            } else {
                CompressionMethod::Stored
            };
            zip.start_file(*name, SimpleFileOptions::default().compression_method(method))
                .unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();

        fixture
    }

    /// JSON body of `data/exercise.json`.
    #[must_use]
    pub fn exercise_json() -> String {
        format!(
            r#"{{"question": "![img]({PLACEHOLDER_TOKEN}/images/a.png)", "answers": ["{PLACEHOLDER_TOKEN}/images/b.png"]}}"#
        )
    }

    /// Body of `media/large.bin`.
    #[must_use]
    pub fn large_bin() -> Vec<u8> {
        (0..300_000u32).map(|i| (i % 251) as u8).collect()
    }

    /// Writes a standalone content file and returns its path.
    pub fn add_file(&self, filename: &str, content: &[u8]) -> PathBuf {
        let path = self.sharded_path(filename);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    /// The content root.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Archive filename as it appears in URLs.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Absolute path of the archive.
    #[must_use]
    pub fn archive_path(&self) -> PathBuf {
        self.sharded_path(&self.filename)
    }

    /// A resolver over the content root.
    #[must_use]
    pub fn storage(&self) -> ContentStorage {
        ContentStorage::new(self.dir.path())
    }

    fn sharded_path(&self, filename: &str) -> PathBuf {
        self.storage().path_for(filename).unwrap()
    }
}
