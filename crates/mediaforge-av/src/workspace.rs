//! Scratch space management for conversion jobs.
//!
//! A [`ScratchArea`] is the root directory all jobs write into. Each job gets
//! its own [`Scratch`] tracker: every file or directory it hands out is
//! registered before anything is written, so [`Scratch::cleanup`] removes
//! partial artifacts too. Cleanup never fails; problems are logged.

use std::fs::File;
use std::path::{Path, PathBuf};

use mediaforge_common::{Error, OutputKind, Result, SourceData, SourceFile};
use parking_lot::Mutex;
use uuid::Uuid;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Root directory for per-job scratch files.
#[derive(Debug, Clone)]
pub struct ScratchArea {
    root: PathBuf,
}

impl ScratchArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start tracking scratch paths for a new job.
    pub fn scratch(&self) -> Scratch {
        Scratch {
            root: self.root.clone(),
            paths: Mutex::new(Vec::new()),
        }
    }
}

/// Scratch paths owned by one job.
#[derive(Debug)]
pub struct Scratch {
    root: PathBuf,
    paths: Mutex<Vec<PathBuf>>,
}

impl Scratch {
    /// Track an externally created path for cleanup.
    pub fn register(&self, path: impl Into<PathBuf>) {
        self.paths.lock().push(path.into());
    }

    /// Snapshot of every path registered so far.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.paths.lock().clone()
    }

    fn fresh_path(&self, suffix: &str) -> PathBuf {
        self.root.join(format!("{}{suffix}", Uuid::new_v4()))
    }

    async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Copy the source into a scratch file named after its original
    /// extension and return the path.
    pub async fn materialize_input(&self, source: &SourceFile) -> Result<PathBuf> {
        self.ensure_root().await?;

        let ext = source.extension().unwrap_or_else(|| "tmp".to_string());
        let path = self.fresh_path(&format!(".{ext}"));
        self.register(&path);

        match &source.data {
            SourceData::Bytes(bytes) => tokio::fs::write(&path, bytes).await?,
            SourceData::Path(src) => {
                tokio::fs::copy(src, &path).await.map_err(|e| {
                    Error::Validation(format!("cannot read source {}: {e}", src.display()))
                })?;
            }
        }

        tracing::debug!("Materialized input {} as {}", source.original_name, path.display());
        Ok(path)
    }

    /// Allocate the job's output: a file path for single-file conversions or a
    /// fresh empty directory for frame sequences.
    pub async fn allocate_output(&self, kind: OutputKind, ext: &str) -> Result<PathBuf> {
        let path = self.reserve_output(kind, ext);
        self.create_output(kind, &path).await?;
        Ok(path)
    }

    /// Pick and register the output path without touching the disk, so a
    /// request rejected while planning leaves nothing behind but its input.
    pub fn reserve_output(&self, kind: OutputKind, ext: &str) -> PathBuf {
        let path = match kind {
            OutputKind::File => self.fresh_path(&format!(".{ext}")),
            OutputKind::FrameSequence => self.fresh_path("-frames"),
        };
        self.register(&path);
        path
    }

    /// Materialize a reserved output. Frame sequences need their directory to
    /// exist before ffmpeg writes into it; files are created by the encoder.
    pub async fn create_output(&self, kind: OutputKind, path: &Path) -> Result<()> {
        self.ensure_root().await?;
        if kind == OutputKind::FrameSequence {
            tokio::fs::create_dir(path).await?;
        }
        Ok(())
    }

    /// Pack the regular files of `dir` into a zip, in lexicographic name
    /// order, and return the zip path.
    pub async fn archive_directory(&self, dir: &Path) -> Result<PathBuf> {
        self.ensure_root().await?;

        let zip_path = self.fresh_path(".zip");
        self.register(&zip_path);

        let source = dir.to_path_buf();
        let target = zip_path.clone();
        let count = tokio::task::spawn_blocking(move || archive_directory_to(&source, &target))
            .await
            .map_err(|e| Error::Internal(format!("archive task failed: {e}")))??;

        tracing::debug!("Archived {count} frames from {} into {}", dir.display(), zip_path.display());
        Ok(zip_path)
    }

    /// Remove every registered path. Safe to call more than once.
    pub async fn cleanup(&self) {
        cleanup_paths(&self.paths()).await;
    }
}

/// Write the regular files directly inside `dir` into a new zip at
/// `zip_path`, sorted by name. Returns the number of entries written.
pub fn archive_directory_to(dir: &Path, zip_path: &Path) -> Result<usize> {
    let archive_err = |e: zip::result::ZipError| Error::Archive(e.to_string());

    let mut zip = ZipWriter::new(File::create(zip_path)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut count = 0;
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Archive(format!("cannot read {}: {e}", dir.display())))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        zip.start_file(name, options).map_err(archive_err)?;
        let mut file = File::open(entry.path())?;
        std::io::copy(&mut file, &mut zip)?;
        count += 1;
    }

    zip.finish().map_err(archive_err)?;
    Ok(count)
}

/// Remove files and directories (recursively). Missing paths are ignored and
/// other failures are logged, never returned.
pub async fn cleanup_paths(paths: &[PathBuf]) {
    for path in paths {
        let result = match tokio::fs::symlink_metadata(path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
            Ok(_) => tokio::fs::remove_file(path).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => tracing::trace!("Removed scratch path {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove scratch path {}: {e}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;

    fn area() -> (tempfile::TempDir, ScratchArea) {
        let dir = tempfile::tempdir().unwrap();
        let area = ScratchArea::new(dir.path().join("scratch"));
        (dir, area)
    }

    #[tokio::test]
    async fn materialize_bytes_keeps_extension() {
        let (_dir, area) = area();
        let scratch = area.scratch();
        let source = SourceFile::from_bytes(b"fake video".to_vec(), "Clip.MOV");

        let path = scratch.materialize_input(&source).await.unwrap();
        assert_eq!(path.extension().unwrap(), "mov");
        assert!(path.starts_with(area.root()));
        assert_eq!(fs::read(&path).unwrap(), b"fake video");
        assert_eq!(scratch.paths(), vec![path]);
    }

    #[tokio::test]
    async fn materialize_path_copies_and_keeps_original() {
        let (dir, area) = area();
        let original = dir.path().join("song.flac");
        fs::write(&original, b"flac bytes").unwrap();
        let scratch = area.scratch();

        let path = scratch
            .materialize_input(&SourceFile::from_path(&original))
            .await
            .unwrap();
        scratch.cleanup().await;

        assert!(!path.exists());
        assert!(original.exists());
    }

    #[tokio::test]
    async fn materialize_missing_path_is_validation_error() {
        let (_dir, area) = area();
        let scratch = area.scratch();
        let err = scratch
            .materialize_input(&SourceFile::from_path("/no/such/input.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn extensionless_input_gets_tmp() {
        let (_dir, area) = area();
        let scratch = area.scratch();
        let path = scratch
            .materialize_input(&SourceFile::from_bytes(vec![1, 2, 3], "upload"))
            .await
            .unwrap();
        assert_eq!(path.extension().unwrap(), "tmp");
    }

    #[tokio::test]
    async fn reserved_frame_directory_appears_only_when_created() {
        let (_dir, area) = area();
        let scratch = area.scratch();

        let frames = scratch.reserve_output(OutputKind::FrameSequence, "png");
        assert!(frames.file_name().unwrap().to_string_lossy().ends_with("-frames"));
        assert!(!frames.exists());
        assert!(!area.root().exists());
        assert_eq!(scratch.paths(), vec![frames.clone()]);

        scratch
            .create_output(OutputKind::FrameSequence, &frames)
            .await
            .unwrap();
        assert!(frames.is_dir());

        scratch.cleanup().await;
        assert!(!frames.exists());
    }

    #[tokio::test]
    async fn allocate_output_file_and_directory() {
        let (_dir, area) = area();
        let scratch = area.scratch();

        let file = scratch.allocate_output(OutputKind::File, "mp3").await.unwrap();
        assert_eq!(file.extension().unwrap(), "mp3");
        assert!(!file.exists());

        let frames = scratch
            .allocate_output(OutputKind::FrameSequence, "png")
            .await
            .unwrap();
        assert!(frames.is_dir());
        assert_eq!(fs::read_dir(&frames).unwrap().count(), 0);

        let intermediate = area.root().join("x-intermediate.mp4");
        scratch.register(&intermediate);
        assert_eq!(scratch.paths(), vec![file, frames, intermediate]);
    }

    #[tokio::test]
    async fn archive_sorts_frames_by_name() {
        let (dir, area) = area();
        let frames = dir.path().join("frames");
        fs::create_dir(&frames).unwrap();
        // Write in reverse so directory order cannot be relied on.
        for i in (1..=10).rev() {
            fs::write(frames.join(format!("frame_{i:05}.png")), format!("frame {i}")).unwrap();
        }
        fs::create_dir(frames.join("nested")).unwrap();

        let scratch = area.scratch();
        let zip_path = scratch.archive_directory(&frames).await.unwrap();
        assert!(scratch.paths().contains(&zip_path));

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        assert_eq!(archive.len(), 10);
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        let expected: Vec<String> = (1..=10).map(|i| format!("frame_{i:05}.png")).collect();
        assert_eq!(names, expected);

        let mut first = String::new();
        archive.by_index(0).unwrap().read_to_string(&mut first).unwrap();
        assert_eq!(first, "frame 1");
    }

    #[tokio::test]
    async fn cleanup_twice_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mp4");
        let sub = dir.path().join("frames");
        fs::write(&file, b"x").unwrap();
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("frame_00001.png"), b"y").unwrap();

        let paths = vec![file.clone(), sub.clone()];
        cleanup_paths(&paths).await;
        cleanup_paths(&paths).await;

        assert!(!file.exists());
        assert!(!sub.exists());
    }

    #[tokio::test]
    async fn scratch_cleanup_removes_everything() {
        let (_dir, area) = area();
        let scratch = area.scratch();
        let input = scratch
            .materialize_input(&SourceFile::from_bytes(vec![0; 16], "in.mp4"))
            .await
            .unwrap();
        let frames = scratch
            .allocate_output(OutputKind::FrameSequence, "png")
            .await
            .unwrap();
        fs::write(frames.join("frame_00001.png"), b"png").unwrap();

        scratch.cleanup().await;
        scratch.cleanup().await;

        assert!(!input.exists());
        assert!(!frames.exists());
        assert_eq!(fs::read_dir(area.root()).unwrap().count(), 0);
    }
}
