//! Static site generation from `workout_*.json` artifacts.
//!
//! Output in the dist directory: `index.html`, one `<slug>.html` per program,
//! and a shared `style.css`. Descriptions are portal rich text and are
//! inserted as-is; every other value is escaped.

use anyhow::{Context, Result, bail};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::artifact::read_artifact;
use crate::artifact::workout::ARTIFACT_PREFIX;
use crate::types::{Exercise, WorkoutArtifact};
use crate::util::escape_html;

/// One program page.
#[derive(Debug, Clone)]
pub struct SiteEntry {
    pub slug: String,
    pub artifact: WorkoutArtifact,
}

/// What `build_site` produced.
#[derive(Debug, Clone)]
pub struct SiteReport {
    pub dist_dir: PathBuf,
    /// `(slug, program name)` in index order.
    pub pages: Vec<(String, String)>,
}

/// Load every readable artifact in `out_dir`, sorted by file name.
/// Unreadable files are skipped with a warning.
pub fn load_entries(out_dir: &Path) -> Result<Vec<SiteEntry>> {
    let pattern = format!(
        "{}/{}*.json",
        glob::Pattern::escape(&out_dir.to_string_lossy()),
        ARTIFACT_PREFIX
    );
    let mut paths: Vec<PathBuf> = glob::glob(&pattern)
        .with_context(|| format!("Invalid artifact pattern: {}", pattern))?
        .filter_map(|entry| entry.ok())
        .collect();
    paths.sort();

    let mut entries = Vec::new();
    for path in paths {
        let Some(slug) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_prefix(ARTIFACT_PREFIX))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
        else {
            continue;
        };
        match read_artifact(&path) {
            Ok(artifact) => entries.push(SiteEntry { slug, artifact }),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable artifact"),
        }
    }
    Ok(entries)
}

/// Render the site for all artifacts in `out_dir` into `dist_dir`.
pub fn build_site(out_dir: &Path, dist_dir: &Path) -> Result<SiteReport> {
    let entries = load_entries(out_dir)?;
    if entries.is_empty() {
        bail!(
            "No workout artifacts found in {}. Run `ptsite export` or `ptsite import` first.",
            out_dir.display()
        );
    }

    fs::create_dir_all(dist_dir)
        .with_context(|| format!("Failed to create {}", dist_dir.display()))?;
    fs::write(dist_dir.join("style.css"), STYLE_CSS).context("Failed to write style.css")?;

    let pages: Vec<(String, String)> = entries
        .iter()
        .map(|e| (e.slug.clone(), page_title(e)))
        .collect();

    for entry in &entries {
        let path = dist_dir.join(format!("{}.html", entry.slug));
        fs::write(&path, render_program_page(entry, &pages))
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    fs::write(dist_dir.join("index.html"), render_index(&pages))
        .context("Failed to write index.html")?;

    info!(pages = pages.len(), dist = %dist_dir.display(), "site built");
    Ok(SiteReport {
        dist_dir: dist_dir.to_path_buf(),
        pages,
    })
}

fn page_title(entry: &SiteEntry) -> String {
    let name = entry.artifact.name.trim();
    if name.is_empty() {
        entry.slug.clone()
    } else {
        name.to_string()
    }
}

/// "3 set(s) · 10 rep(s) · hold 5 seconds", or "—" when nothing is known.
pub fn format_dosage(exercise: &Exercise) -> String {
    let mut parts = Vec::new();
    if let Some(sets) = exercise.sets {
        parts.push(format!("{} set(s)", sets));
    }
    if let Some(reps) = exercise.reps {
        parts.push(format!("{} rep(s)", reps));
    }
    if let Some(hold) = &exercise.hold {
        parts.push(format!("hold {}", hold));
    }
    if parts.is_empty() {
        "—".to_string()
    } else {
        parts.join(" · ")
    }
}

fn render_program_page(entry: &SiteEntry, pages: &[(String, String)]) -> String {
    let title = page_title(entry);
    let nav = pages
        .iter()
        .map(|(slug, name)| {
            if *slug == entry.slug {
                format!("<strong>{}</strong>", escape_html(name))
            } else {
                format!(r#"<a href="{}.html">{}</a>"#, slug, escape_html(name))
            }
        })
        .collect::<Vec<_>>()
        .join(" · ");

    let mut exercises = String::new();
    for exercise in &entry.artifact.exercises {
        let name = if exercise.name.trim().is_empty() {
            "Exercise"
        } else {
            exercise.name.as_str()
        };
        let _ = write!(
            exercises,
            "\n    <article class=\"exercise\">\n      <h3>{}</h3>\n      <p class=\"dosage\">{}</p>",
            escape_html(name),
            escape_html(&format_dosage(exercise))
        );
        let description = exercise.description.trim();
        if !description.is_empty() {
            let _ = write!(
                exercises,
                "\n      <div class=\"description\">{}</div>",
                description
            );
        }
        if let Some(note) = exercise.note.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            let _ = write!(
                exercises,
                "\n      <p class=\"note\"><strong>Note:</strong> {}</p>",
                escape_html(note)
            );
        }
        exercises.push_str("\n    </article>");
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{title}</title>
  <link rel="stylesheet" href="style.css">
</head>
<body>
  <header>
    <nav class="programs">Switch: {nav}</nav>
    <h1>{title}</h1>
  </header>
  <main>
    <p class="count">{count} exercise(s)</p>{exercises}
  </main>
  <footer><a href="index.html">All programs</a></footer>
</body>
</html>
"#,
        title = escape_html(&title),
        nav = nav,
        count = entry.artifact.exercises.len(),
        exercises = exercises,
    )
}

fn render_index(pages: &[(String, String)]) -> String {
    let links: String = pages
        .iter()
        .map(|(slug, name)| {
            format!(
                "\n      <li><a href=\"{}.html\">{}</a></li>",
                slug,
                escape_html(name)
            )
        })
        .collect();
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>My workouts</title>
  <link rel="stylesheet" href="style.css">
</head>
<body>
  <header><h1>My workouts</h1></header>
  <main>
    <ul class="program-list">{links}
    </ul>
  </main>
</body>
</html>
"#
    )
}

const STYLE_CSS: &str = r#":root { --bg: #fafafa; --fg: #111; --muted: #555; --accent: #0a5; --border: #ddd; }
@media (prefers-color-scheme: dark) {
  :root { --bg: #1a1a1a; --fg: #eaeaea; --muted: #999; --accent: #2d8; --border: #333; }
}
body { font-family: system-ui, sans-serif; max-width: 52rem; margin: 0 auto; padding: 1rem; background: var(--bg); color: var(--fg); line-height: 1.5; }
header { margin-bottom: 1.5rem; }
header h1 { font-size: 1.5rem; margin: 0; }
nav.programs { font-size: 0.9rem; margin-top: 0.5rem; }
nav.programs a { margin-right: 0.75rem; }
main .count { color: var(--muted); margin-bottom: 1rem; }
article.exercise { border: 1px solid var(--border); border-radius: 0.5rem; padding: 1rem; margin-bottom: 1rem; }
article.exercise h3 { margin: 0 0 0.25rem; font-size: 1.1rem; }
.dosage { margin: 0 0 0.5rem; color: var(--muted); font-size: 0.9rem; }
.description { margin: 0.5rem 0; }
.description ul { margin: 0.25rem 0; }
.note { margin: 0.5rem 0 0; font-size: 0.9rem; }
footer { margin-top: 2rem; font-size: 0.9rem; color: var(--muted); }
ul.program-list { list-style: none; padding: 0; }
ul.program-list a { color: var(--accent); }
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::write_artifact;
    use crate::types::ExtractedProgram;
    use tempfile::tempdir;

    fn exercise(name: &str) -> Exercise {
        Exercise {
            name: name.into(),
            description: String::new(),
            sets: None,
            reps: None,
            hold: None,
            note: None,
        }
    }

    fn write(out: &Path, label: &str, name: &str, exercises: Vec<Exercise>) {
        write_artifact(
            out,
            &ExtractedProgram {
                label: label.into(),
                name: name.into(),
                exercises,
            },
        )
        .unwrap();
    }

    #[test]
    fn test_format_dosage() {
        let mut ex = exercise("Bridge");
        assert_eq!(format_dosage(&ex), "—");
        ex.sets = Some(3);
        ex.reps = Some(10);
        ex.hold = Some("5 seconds".into());
        assert_eq!(format_dosage(&ex), "3 set(s) · 10 rep(s) · hold 5 seconds");
        ex.sets = None;
        assert_eq!(format_dosage(&ex), "10 rep(s) · hold 5 seconds");
    }

    #[test]
    fn test_build_site_writes_pages_and_index() {
        let out = tempdir().unwrap();
        let dist = tempdir().unwrap();
        let mut bridge = exercise("Bridge");
        bridge.description = "<ul><li>Lift hips</li></ul>".into();
        bridge.note = Some("Stop if <pain>".into());
        write(out.path(), "neck", "Neck & shoulders", vec![exercise("Chin tuck")]);
        write(out.path(), "knee", "Knee", vec![bridge]);

        let report = build_site(out.path(), dist.path()).unwrap();
        assert_eq!(
            report.pages,
            vec![
                ("knee".to_string(), "Knee".to_string()),
                ("neck".to_string(), "Neck & shoulders".to_string()),
            ]
        );

        let knee = fs::read_to_string(dist.path().join("knee.html")).unwrap();
        assert!(knee.contains("<ul><li>Lift hips</li></ul>"));
        assert!(knee.contains("Stop if &lt;pain&gt;"));
        assert!(knee.contains(r#"<a href="neck.html">Neck &amp; shoulders</a>"#));
        assert!(knee.contains("<strong>Knee</strong>"));
        assert!(knee.contains("1 exercise(s)"));

        let index = fs::read_to_string(dist.path().join("index.html")).unwrap();
        assert!(index.contains(r#"<a href="knee.html">Knee</a>"#));
        assert!(dist.path().join("style.css").exists());
    }

    #[test]
    fn test_build_site_without_artifacts_fails() {
        let out = tempdir().unwrap();
        let dist = tempdir().unwrap();
        let err = build_site(out.path(), dist.path()).unwrap_err();
        assert!(err.to_string().contains("No workout artifacts"));
    }

    #[test]
    fn test_unreadable_artifacts_are_skipped() {
        let out = tempdir().unwrap();
        fs::write(out.path().join("workout_broken.json"), "{ not json").unwrap();
        write(out.path(), "knee", "Knee", Vec::new());
        let entries = load_entries(out.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].slug, "knee");
    }
}
