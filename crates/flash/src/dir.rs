use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use ron::ser::PrettyConfig;
use tracing::{debug, warn};

use crate::{check_name, BlockDevice, DirEntry, FileHandle, FlashError, ERASED_BYTE};

/// Name of the allocation table kept next to the data files.
pub const DIRECTORY_FILE: &str = "FLASHDIR";

/// A flash chip emulated by a host directory.
///
/// Every flash file is a host file of exactly its allocated size, pre-filled
/// with erased bytes. Allocation order and chip addresses live in a RON
/// list of [`DirEntry`] values, so listings and start addresses survive
/// between runs. Host files stay open once touched.
#[derive(Debug)]
pub struct DirFlash {
    root: PathBuf,
    capacity: u32,
    block_size: u32,
    files: Vec<DirEntry>,
    handles: HashMap<String, File>,
}

impl DirFlash {
    /// Opens (or initializes) a chip image rooted at `root`.
    pub fn open<P: AsRef<Path>>(root: P, capacity: u32, block_size: u32) -> Result<Self, FlashError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        let files = load_directory(&root.join(DIRECTORY_FILE))?;
        Ok(Self {
            root,
            capacity,
            block_size,
            files,
            handles: HashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn next_free(&self) -> u32 {
        self.files.last().map(|f| f.address + f.size).unwrap_or(0)
    }

    fn save_directory(&self) -> Result<(), FlashError> {
        let text = ron::ser::to_string_pretty(&self.files, PrettyConfig::default())?;
        fs::write(self.root.join(DIRECTORY_FILE), text)?;
        Ok(())
    }

    fn host_file(&mut self, name: &str) -> Result<&mut File, FlashError> {
        match self.handles.entry(name.to_string()) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => {
                let file = OpenOptions::new().read(true).write(true).open(self.root.join(name))?;
                Ok(e.insert(file))
            }
        }
    }

    /// Writes a fresh host file of `size` erased bytes. A leftover host file
    /// the directory does not know about is overwritten.
    fn allocate(&self, name: &str, size: u32) -> io::Result<()> {
        let path = self.root.join(name);
        let result = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&path)
            .and_then(|mut file| {
                file.write_all(&vec![ERASED_BYTE; size as usize])?;
                file.sync_all()
            });
        if result.is_err() {
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "could not remove partial file");
            }
        }
        result
    }
}

fn load_directory(path: &Path) -> Result<Vec<DirEntry>, FlashError> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    ron::from_str(&text).map_err(|e| FlashError::CorruptDirectory(e.to_string()))
}

impl BlockDevice for DirFlash {
    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn identify(&self) -> [u8; 3] {
        [0xEF, 0x40, 0x15]
    }

    fn ready(&mut self) -> bool {
        true
    }

    fn erase_all(&mut self) -> Result<(), FlashError> {
        self.handles.clear();
        for f in self.files.drain(..) {
            match fs::remove_file(self.root.join(&f.name)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.save_directory()?;
        debug!(root = %self.root.display(), "dir flash erased");
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.files.iter().any(|f| f.name == name)
    }

    fn create(&mut self, name: &str, size: u32) -> Result<bool, FlashError> {
        check_name(name)?;
        if name == DIRECTORY_FILE || self.exists(name) {
            return Ok(false);
        }
        let address = self.next_free();
        match address.checked_add(size) {
            Some(end) if end <= self.capacity => {}
            _ => return Ok(false),
        }

        self.allocate(name, size)?;
        self.files.push(DirEntry {
            name: name.to_string(),
            address,
            size,
        });
        self.save_directory()?;
        Ok(true)
    }

    fn open(&mut self, name: &str) -> Result<Option<FileHandle>, FlashError> {
        Ok(self
            .files
            .iter()
            .find(|f| f.name == name)
            .map(|f| FileHandle::new(f.name.clone(), f.address, f.size)))
    }

    fn read(&mut self, file: &mut FileHandle, buf: &mut [u8]) -> Result<usize, FlashError> {
        let n = file.clamp(buf.len());
        let host = self.host_file(file.name())?;
        host.seek(SeekFrom::Start(u64::from(file.position())))?;
        host.read_exact(&mut buf[..n])?;
        file.advance(n);
        Ok(n)
    }

    fn write(&mut self, file: &mut FileHandle, buf: &[u8]) -> Result<usize, FlashError> {
        let n = file.clamp(buf.len());
        let host = self.host_file(file.name())?;
        host.seek(SeekFrom::Start(u64::from(file.position())))?;
        host.write_all(&buf[..n])?;
        file.advance(n);
        Ok(n)
    }

    fn list(&self) -> Result<Vec<DirEntry>, FlashError> {
        Ok(self.files.clone())
    }
}
