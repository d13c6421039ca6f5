//! File-based storage implementation.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;

use crate::error::{BlockTermsError, Result};
use crate::storage::{Storage, StorageConfig, StorageError, StorageInput, StorageOutput};

/// A file-based storage implementation rooted at one directory.
#[derive(Debug)]
pub struct FileStorage {
    /// The root directory for storage.
    directory: PathBuf,
    /// Storage configuration.
    config: StorageConfig,
}

impl FileStorage {
    /// Create a new file storage in the given directory.
    pub fn new<P: AsRef<Path>>(directory: P, config: StorageConfig) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();

        // Create directory if it doesn't exist
        if !directory.exists() {
            std::fs::create_dir_all(&directory).map_err(|e| {
                BlockTermsError::storage(format!("Failed to create directory: {e}"))
            })?;
        }

        // Verify it's a directory
        if !directory.is_dir() {
            return Err(BlockTermsError::storage(format!(
                "Path is not a directory: {}",
                directory.display()
            )));
        }

        Ok(FileStorage { directory, config })
    }

    /// Get the full path for a file name.
    fn file_path(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    fn not_found_or_io(name: &str, e: io::Error) -> BlockTermsError {
        if e.kind() == io::ErrorKind::NotFound {
            StorageError::FileNotFound(name.to_string()).into()
        } else {
            StorageError::IoError(e.to_string()).into()
        }
    }
}

impl Storage for FileStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let path = self.file_path(name);
        let file = File::open(&path).map_err(|e| Self::not_found_or_io(name, e))?;
        let size = file
            .metadata()
            .map_err(|e| BlockTermsError::storage(format!("Failed to get file metadata: {e}")))?
            .len();

        // Zero-length files cannot be mapped on every platform.
        if self.config.use_mmap && size > 0 {
            // SAFETY: segment files are write-once; nothing truncates or
            // rewrites a file while readers have it mapped.
            let mmap = unsafe { Mmap::map(&file) }
                .map_err(|e| BlockTermsError::storage(format!("Failed to mmap file {name}: {e}")))?;
            Ok(Box::new(MmapInput::new(Arc::new(mmap))))
        } else {
            Ok(Box::new(FileInput::new(
                file,
                path,
                size,
                self.config.buffer_size,
            )))
        }
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let path = self.file_path(name);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| StorageError::IoError(e.to_string()))?;

        Ok(Box::new(FileOutput::new(
            file,
            self.config.buffer_size,
            self.config.sync_writes,
        )))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.file_path(name).exists()
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        let path = self.file_path(name);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| StorageError::IoError(format!("Failed to delete file: {e}")))?;
        }

        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();

        for entry in
            std::fs::read_dir(&self.directory).map_err(|e| StorageError::IoError(e.to_string()))?
        {
            let entry = entry.map_err(|e| StorageError::IoError(e.to_string()))?;
            let path = entry.path();

            if path.is_file()
                && let Some(name) = path.file_name().and_then(|n| n.to_str())
            {
                files.push(name.to_string());
            }
        }

        files.sort();
        Ok(files)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        let metadata = self
            .file_path(name)
            .metadata()
            .map_err(|e| Self::not_found_or_io(name, e))?;

        Ok(metadata.len())
    }
}

/// A buffered file input. Clones reopen the file.
#[derive(Debug)]
pub struct FileInput {
    reader: BufReader<File>,
    path: PathBuf,
    size: u64,
    buffer_size: usize,
}

impl FileInput {
    fn new(file: File, path: PathBuf, size: u64, buffer_size: usize) -> Self {
        FileInput {
            reader: BufReader::with_capacity(buffer_size, file),
            path,
            size,
            buffer_size,
        }
    }
}

impl Read for FileInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Seek for FileInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.reader.seek(pos)
    }
}

impl StorageInput for FileInput {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }

    fn clone_input(&self) -> Result<Box<dyn StorageInput>> {
        let file = File::open(&self.path).map_err(|e| StorageError::IoError(e.to_string()))?;
        Ok(Box::new(FileInput::new(
            file,
            self.path.clone(),
            self.size,
            self.buffer_size,
        )))
    }

    fn close(&mut self) -> Result<()> {
        // The file is closed when the BufReader is dropped
        Ok(())
    }
}

/// Memory-mapped input stream; clones share the mapping.
#[derive(Debug)]
pub struct MmapInput {
    mmap: Arc<Mmap>,
    pos: u64,
}

impl MmapInput {
    fn new(mmap: Arc<Mmap>) -> Self {
        MmapInput { mmap, pos: 0 }
    }
}

impl Read for MmapInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data: &[u8] = &self.mmap;
        let start = (self.pos as usize).min(data.len());
        let len = buf.len().min(data.len() - start);
        buf[..len].copy_from_slice(&data[start..start + len]);
        self.pos += len as u64;
        Ok(len)
    }
}

impl Seek for MmapInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(offset) => (self.mmap.len() as u64).checked_add_signed(offset),
            SeekFrom::Current(offset) => self.pos.checked_add_signed(offset),
        };

        let new_pos = new_pos.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "Invalid seek position")
        })?;
        self.pos = new_pos;
        Ok(new_pos)
    }
}

impl StorageInput for MmapInput {
    fn size(&self) -> Result<u64> {
        Ok(self.mmap.len() as u64)
    }

    fn clone_input(&self) -> Result<Box<dyn StorageInput>> {
        Ok(Box::new(MmapInput::new(Arc::clone(&self.mmap))))
    }

    fn close(&mut self) -> Result<()> {
        // The mapping is released with the last clone
        Ok(())
    }
}

/// A file output implementation.
#[derive(Debug)]
pub struct FileOutput {
    writer: BufWriter<File>,
    sync_writes: bool,
    position: u64,
    closed: bool,
}

impl FileOutput {
    fn new(file: File, buffer_size: usize, sync_writes: bool) -> Self {
        FileOutput {
            writer: BufWriter::with_capacity(buffer_size, file),
            sync_writes,
            position: 0,
            closed: false,
        }
    }
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let bytes_written = self.writer.write(buf)?;
        self.position += bytes_written as u64;
        Ok(bytes_written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl StorageOutput for FileOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| BlockTermsError::storage(format!("Failed to flush: {e}")))?;

        self.writer
            .get_ref()
            .sync_all()
            .map_err(|e| BlockTermsError::storage(format!("Failed to sync: {e}")))?;

        Ok(())
    }

    fn position(&self) -> Result<u64> {
        Ok(self.position)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.sync_writes {
            self.flush_and_sync()?;
        } else {
            self.writer.flush()?;
        }
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage(use_mmap: bool) -> (TempDir, FileStorage) {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            use_mmap,
            ..StorageConfig::default()
        };
        let storage = FileStorage::new(temp_dir.path(), config).unwrap();
        (temp_dir, storage)
    }

    #[test]
    fn test_create_and_read_file() {
        for use_mmap in [true, false] {
            let (_temp_dir, storage) = create_test_storage(use_mmap);

            let mut output = storage.create_output("test.bin").unwrap();
            output.write_all(b"Hello, World!").unwrap();
            output.close().unwrap();

            let mut input = storage.open_input("test.bin").unwrap();
            let mut buffer = Vec::new();
            input.read_to_end(&mut buffer).unwrap();

            assert_eq!(buffer, b"Hello, World!");
            assert_eq!(input.size().unwrap(), 13);
        }
    }

    #[test]
    fn test_file_operations() {
        let (_temp_dir, storage) = create_test_storage(true);
        assert!(!storage.file_exists("test.bin"));

        let mut output = storage.create_output("test.bin").unwrap();
        output.write_all(b"Test content").unwrap();
        output.close().unwrap();

        assert!(storage.file_exists("test.bin"));
        assert_eq!(storage.file_size("test.bin").unwrap(), 12);
        assert_eq!(storage.list_files().unwrap(), vec!["test.bin"]);

        storage.delete_file("test.bin").unwrap();
        assert!(!storage.file_exists("test.bin"));
    }

    #[test]
    fn test_clone_input() {
        for use_mmap in [true, false] {
            let (_temp_dir, storage) = create_test_storage(use_mmap);

            let mut output = storage.create_output("test.bin").unwrap();
            output.write_all(b"0123456789").unwrap();
            output.close().unwrap();

            let mut input = storage.open_input("test.bin").unwrap();
            input.seek(SeekFrom::Start(7)).unwrap();
            let mut clone = input.clone_input().unwrap();

            let mut buffer = [0u8; 3];
            clone.read_exact(&mut buffer).unwrap();
            assert_eq!(&buffer, b"012");
            input.read_exact(&mut buffer).unwrap();
            assert_eq!(&buffer, b"789");
        }
    }

    #[test]
    fn test_empty_file_is_readable() {
        let (_temp_dir, storage) = create_test_storage(true);
        let mut output = storage.create_output("empty.bin").unwrap();
        output.close().unwrap();

        let input = storage.open_input("empty.bin").unwrap();
        assert_eq!(input.size().unwrap(), 0);
    }

    #[test]
    fn test_file_not_found() {
        let (_temp_dir, storage) = create_test_storage(true);

        assert!(storage.open_input("missing.bin").is_err());
        assert!(storage.file_size("missing.bin").is_err());
    }
}
