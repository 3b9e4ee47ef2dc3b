use crate::db::DB_FILE;
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/rosterd.sqlite3";
pub const BUNDLE_FORMAT: &str = "rosterd-workspace-v1";
const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    format: String,
    app_version: String,
    exported_at: String,
    db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE);
    let db_bytes = std::fs::read(&db_path)
        .with_context(|| format!("workspace database not found: {}", db_path.display()))?;

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let out_file = File::create(out_path)
        .with_context(|| format!("failed to create output file {}", out_path.display()))?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = Manifest {
        format: BUNDLE_FORMAT.to_string(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        exported_at: chrono::Utc::now().to_rfc3339(),
        db_sha256: sha256_hex(&db_bytes),
    };
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    zip.write_all(&db_bytes)
        .context("failed to write database entry")?;
    zip.finish().context("failed to finalize zip bundle")?;

    info!(path = %out_path.display(), "workspace exported");
    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT.to_string(),
        db_sha256: manifest.db_sha256,
    })
}

/// Restores a bundle into `workspace_path`, replacing its database. Nothing
/// is touched unless the bundle and its database entry check out. The
/// database must not be open while this runs.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    if !is_zip_file(in_path)? {
        return Err(anyhow!("not a workspace bundle: {}", in_path.display()));
    }

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.display()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: Manifest =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid")?;
    if manifest.format != BUNDLE_FORMAT {
        return Err(anyhow!("unsupported bundle format: {}", manifest.format));
    }

    let mut db_bytes = Vec::new();
    archive
        .by_name(DB_ENTRY)
        .context("bundle missing db/rosterd.sqlite3")?
        .read_to_end(&mut db_bytes)
        .context("failed to extract database entry")?;
    let actual = sha256_hex(&db_bytes);
    if actual != manifest.db_sha256 {
        return Err(anyhow!(
            "database checksum mismatch: manifest {}, bundle {}",
            manifest.db_sha256,
            actual
        ));
    }

    if !db_bytes.starts_with(SQLITE_HEADER) {
        return Err(anyhow!("database entry is not an SQLite database"));
    }

    std::fs::create_dir_all(workspace_path)
        .with_context(|| format!("failed to create workspace {}", workspace_path.display()))?;
    let dst = workspace_path.join(DB_FILE);
    let tmp_dst = workspace_path.join(format!("{}.importing", DB_FILE));
    std::fs::write(&tmp_dst, &db_bytes)
        .with_context(|| format!("failed to write temp database {}", tmp_dst.display()))?;
    if dst.exists() {
        std::fs::remove_file(&dst)
            .with_context(|| format!("failed to remove existing database {}", dst.display()))?;
    }
    std::fs::rename(&tmp_dst, &dst)
        .with_context(|| format!("failed to move extracted database to {}", dst.display()))?;

    info!(workspace = %workspace_path.display(), "workspace imported");
    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT.to_string(),
    })
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.display()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn temp_dir(prefix: &str) -> std::path::PathBuf {
        let p = std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    #[test]
    fn sha256_hex_matches_known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn tampered_database_entry_is_rejected() {
        let src = temp_dir("rosterd-backup-tamper-src");
        let dst = temp_dir("rosterd-backup-tamper-dst");
        std::fs::write(src.join(DB_FILE), b"original").expect("write db");
        let bundle = src.join("bundle.zip");
        export_workspace_bundle(&src, &bundle).expect("export");

        // Rebuild the archive with the original manifest but different db bytes.
        let mut manifest = String::new();
        ZipArchive::new(File::open(&bundle).expect("open"))
            .expect("zip")
            .by_name(MANIFEST_ENTRY)
            .expect("manifest")
            .read_to_string(&mut manifest)
            .expect("read manifest");
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buf);
            let opts = FileOptions::default();
            zip.start_file(MANIFEST_ENTRY, opts).expect("start");
            zip.write_all(manifest.as_bytes()).expect("write");
            zip.start_file(DB_ENTRY, opts).expect("start");
            zip.write_all(b"tampered").expect("write");
            zip.finish().expect("finish");
        }
        let tampered = src.join("tampered.zip");
        std::fs::write(&tampered, buf.into_inner()).expect("write tampered");

        let e = import_workspace_bundle(&tampered, &dst).expect_err("checksum");
        assert!(e.to_string().contains("checksum mismatch"));
        assert!(!dst.join(DB_FILE).exists());

        let _ = std::fs::remove_dir_all(src);
        let _ = std::fs::remove_dir_all(dst);
    }

    #[test]
    fn non_bundle_file_leaves_existing_database_alone() {
        let ws = temp_dir("rosterd-backup-textfile");
        std::fs::write(ws.join(DB_FILE), b"SQLite format 3\0existing").expect("write db");
        let notes = ws.join("notes.txt");
        std::fs::write(&notes, b"this is not a database at all").expect("write notes");

        let e = import_workspace_bundle(&notes, &ws).expect_err("not a bundle");
        assert!(e.to_string().contains("not a workspace bundle"));
        let kept = std::fs::read(ws.join(DB_FILE)).expect("read db");
        assert_eq!(kept, b"SQLite format 3\0existing");

        let _ = std::fs::remove_dir_all(ws);
    }

    #[test]
    fn bundle_with_non_sqlite_database_entry_is_rejected() {
        let src = temp_dir("rosterd-backup-notsqlite-src");
        let dst = temp_dir("rosterd-backup-notsqlite-dst");
        // Checksum matches, contents are not a database.
        std::fs::write(src.join(DB_FILE), b"plain text").expect("write db");
        let bundle = src.join("bundle.zip");
        export_workspace_bundle(&src, &bundle).expect("export");

        let e = import_workspace_bundle(&bundle, &dst).expect_err("not sqlite");
        assert!(e.to_string().contains("not an SQLite database"));
        assert!(!dst.join(DB_FILE).exists());

        let _ = std::fs::remove_dir_all(src);
        let _ = std::fs::remove_dir_all(dst);
    }
}
