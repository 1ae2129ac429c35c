//! Container fixtures

use romfetch::DownloadManager;
use romfetch::archive::metainfo::build_metainfo;
use std::path::PathBuf;

/// ROMs in the Genesis fixture container, as `(file name, size)`
pub const GENESIS_ROMS: &[(&str, u64)] = &[
    ("SONIC.BIN", 512 * 1024),
    ("Sonic the Hedgehog 2 (World).bin", 1024 * 1024),
    ("Streets of Rage (Europe).bin", 512 * 1024),
    ("Ecco the Dolphin (USA).bin", 1024 * 1024),
];

/// Write a `.torrent` into the structured container directory of a console
pub fn write_container(
    manager: &DownloadManager,
    manufacturer: &str,
    console: &str,
    file_name: &str,
    files: &[(&str, u64)],
) -> PathBuf {
    let dir = manager.layout().container_dir(manufacturer, console);
    std::fs::create_dir_all(&dir).expect("failed to create container dir");
    let path = dir.join(file_name);
    let torrent_name = file_name.trim_end_matches(".torrent");
    std::fs::write(&path, build_metainfo(torrent_name, files)).expect("failed to write container");
    path
}

/// Write `genesis.torrent` for Sega/Genesis
pub fn write_genesis_container(manager: &DownloadManager) -> PathBuf {
    write_container(manager, "Sega", "Genesis", "genesis.torrent", GENESIS_ROMS)
}
