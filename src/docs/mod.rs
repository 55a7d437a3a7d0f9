pub mod types;

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use walkdir::WalkDir;

use types::{AffectedDocument, AffectedGuide, Impact};

const CONTROLS_DIR: &str = "controls";
const PILLAR_PREFIX: &str = "pillar-";
const GUIDES_DIR: &[&str] = &["playbooks", "control-implementations"];

static TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#\s+(.+)$").expect("valid title regex"));

/// Read-only view of the local documentation tree, scanned for URL references.
///
/// Layout:
/// - `controls/pillar-*/<id>-<slug>.md`: control documents
/// - `playbooks/control-implementations/<id>/<guide-type>.md`: implementation guides
pub struct DocumentCorpus {
    root: PathBuf,
    /// File contents, loaded on first lookup and reused for the rest of the run.
    content_cache: Option<Vec<CorpusFile>>,
}

struct CorpusFile {
    kind: FileKind,
    path: PathBuf,
    content: String,
}

enum FileKind {
    Control,
    Guide { control_id: String },
}

impl DocumentCorpus {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            content_cache: None,
        }
    }

    /// Every control and guide whose text contains `url` verbatim, ordered by path.
    pub fn find_affected(&mut self, url: &str) -> Impact {
        let root = self.root.clone();
        let files = self.content_cache.get_or_insert_with(|| load_files(&root));

        let mut impact = Impact::default();
        for file in files.iter().filter(|f| f.content.contains(url)) {
            let stem = file_stem(&file.path);
            let file_path = relative(&root, &file.path);
            match &file.kind {
                FileKind::Control => impact.documents.push(AffectedDocument {
                    control_id: stem.split('-').next().unwrap_or(&stem).to_string(),
                    title: TITLE
                        .captures(&file.content)
                        .map(|c| c[1].trim().to_string())
                        .unwrap_or_else(|| stem.clone()),
                    file_path,
                }),
                FileKind::Guide { control_id } => impact.guides.push(AffectedGuide {
                    control_id: control_id.clone(),
                    priority: AffectedGuide::priority_for(&stem),
                    guide_type: stem,
                    file_path,
                }),
            }
        }
        impact
    }
}

fn load_files(root: &Path) -> Vec<CorpusFile> {
    let mut files = Vec::new();

    let controls = root.join(CONTROLS_DIR);
    for path in markdown_two_deep(&controls) {
        let in_pillar = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(PILLAR_PREFIX));
        if !in_pillar {
            continue;
        }
        if let Some(content) = read(&path) {
            files.push(CorpusFile {
                kind: FileKind::Control,
                path,
                content,
            });
        }
    }

    let guides = GUIDES_DIR.iter().fold(root.to_path_buf(), |p, d| p.join(d));
    for path in markdown_two_deep(&guides) {
        let Some(control_id) = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
        else {
            continue;
        };
        if let Some(content) = read(&path) {
            files.push(CorpusFile {
                kind: FileKind::Guide { control_id },
                path,
                content,
            });
        }
    }

    debug!(root = %root.display(), files = files.len(), "document corpus loaded");
    files
}

/// `<dir>/<sub>/<file>.md`, sorted by path. A missing `dir` yields nothing.
fn markdown_two_deep(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    WalkDir::new(dir)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
        .collect()
}

fn read(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "skipping unreadable document");
            None
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::types::Priority;

    const URL: &str = "https://learn.microsoft.com/entra/identity/conditional-access/overview";

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn corpus() -> (tempfile::TempDir, DocumentCorpus) {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path();
        write(
            root,
            "controls/pillar-1-security/1.11-conditional-access.md",
            &format!("# Control 1.11: Conditional Access\n\nSee [CA]({URL}).\n"),
        );
        write(
            root,
            "controls/pillar-2-management/2.1-untitled.md",
            &format!("No heading here, only {URL}\n"),
        );
        write(root, "controls/pillar-3-reporting/3.1-other.md", "# Other\n");
        write(root, "controls/not-a-pillar/9.9-ignored.md", URL);
        write(
            root,
            "playbooks/control-implementations/1.11/portal-walkthrough.md",
            &format!("1. Go to {URL}\n"),
        );
        write(
            root,
            "playbooks/control-implementations/1.11/powershell-setup.md",
            &format!("Docs: {URL}\n"),
        );
        write(
            root,
            "playbooks/control-implementations/2.1/verification-testing.md",
            "nothing",
        );
        let corpus = DocumentCorpus::new(root);
        (dir, corpus)
    }

    #[test]
    fn finds_documents_with_titles() {
        let (_dir, mut corpus) = corpus();
        let impact = corpus.find_affected(URL);

        assert_eq!(
            impact.documents,
            vec![
                AffectedDocument {
                    control_id: "1.11".into(),
                    title: "Control 1.11: Conditional Access".into(),
                    file_path: "controls/pillar-1-security/1.11-conditional-access.md".into(),
                },
                AffectedDocument {
                    control_id: "2.1".into(),
                    title: "2.1-untitled".into(),
                    file_path: "controls/pillar-2-management/2.1-untitled.md".into(),
                },
            ]
        );
    }

    #[test]
    fn finds_guides_with_priorities() {
        let (_dir, mut corpus) = corpus();
        let impact = corpus.find_affected(URL);

        let got: Vec<(&str, &str, Priority)> = impact
            .guides
            .iter()
            .map(|g| (g.control_id.as_str(), g.guide_type.as_str(), g.priority))
            .collect();
        assert_eq!(
            got,
            vec![
                ("1.11", "portal-walkthrough", Priority::Critical),
                ("1.11", "powershell-setup", Priority::High),
            ]
        );
        assert_eq!(
            impact.guides[0].file_path,
            "playbooks/control-implementations/1.11/portal-walkthrough.md"
        );
    }

    #[test]
    fn unreferenced_url_has_no_impact() {
        let (_dir, mut corpus) = corpus();
        assert!(corpus.find_affected("https://learn.microsoft.com/unused").is_empty());
    }

    #[test]
    fn missing_tree_has_no_impact() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut corpus = DocumentCorpus::new(dir.path().join("absent"));
        assert!(corpus.find_affected(URL).is_empty());
    }

    #[test]
    fn contents_are_cached_for_the_run() {
        let (dir, mut corpus) = corpus();
        assert_eq!(corpus.find_affected(URL).documents.len(), 2);

        std::fs::remove_file(dir.path().join("controls/pillar-1-security/1.11-conditional-access.md"))
            .unwrap();
        assert_eq!(corpus.find_affected(URL).documents.len(), 2);
    }
}
