//! Node record store, binned by proximity order, with JSON persistence.

use std::{
    collections::HashMap,
    ffi::OsString,
    fs::{self, File},
    io::{self, BufReader, BufWriter},
    path::{Path, PathBuf},
};

use bzz_primitives::Address;

use crate::{KademliaError, NodeRecord};

/// Records of every known node, grouped by proximity order to the local address.
#[derive(Debug, Default)]
pub struct NodeDb {
    bins: Vec<Vec<NodeRecord>>,
    index: HashMap<Address, usize>,
}

impl NodeDb {
    pub fn new(num_bins: usize) -> Self {
        Self { bins: vec![Vec::new(); num_bins], index: HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn get(&self, addr: &Address) -> Option<&NodeRecord> {
        let po = *self.index.get(addr)?;
        self.bins.get(po)?.iter().find(|r| r.addr == *addr)
    }

    pub fn get_mut(&mut self, addr: &Address) -> Option<&mut NodeRecord> {
        let po = *self.index.get(addr)?;
        self.bins.get_mut(po)?.iter_mut().find(|r| r.addr == *addr)
    }

    /// Insert into bin `po` unless a record for the address exists.
    /// Out-of-range bins land in the deepest one.
    pub fn insert_if_absent(&mut self, po: usize, record: NodeRecord) -> bool {
        if self.index.contains_key(&record.addr) {
            return false;
        }
        let po = po.min(self.bins.len().saturating_sub(1));
        let Some(bin) = self.bins.get_mut(po) else {
            return false;
        };
        self.index.insert(record.addr, po);
        bin.push(record);
        true
    }

    /// Records in bin `po`.
    pub fn bin(&self, po: usize) -> &[NodeRecord] {
        self.bins.get(po).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn records(&self) -> impl Iterator<Item = &NodeRecord> {
        self.bins.iter().flatten()
    }

    /// Keep only the records matching `keep`, returning how many were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&NodeRecord) -> bool) -> usize {
        let before = self.index.len();
        let index = &mut self.index;
        for bin in &mut self.bins {
            bin.retain(|r| {
                let kept = keep(r);
                if !kept {
                    index.remove(&r.addr);
                }
                kept
            });
        }
        before - self.index.len()
    }
}

/// Read persisted records. A missing file is an empty set.
pub fn load_file(path: &Path) -> Result<Vec<NodeRecord>, KademliaError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| KademliaError::Serialization(e.to_string()))
}

/// Write records as a JSON array, atomically through `<path>.tmp`.
pub fn save_file(path: &Path, records: &[NodeRecord]) -> Result<(), KademliaError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = tmp_path(path);
    {
        let file = File::create(&tmp_path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, records)
            .map_err(|e| KademliaError::Serialization(e.to_string()))?;
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}
