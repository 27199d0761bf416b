//! Restart behavior of the storage manager: interrupted writes, leftover
//! temp files and the layout version policy.

use tuffpad_core::storage::{FsOp, MountState};
use tuffpad_core::{
    DeviceConfig, FileSystem, FsErrorKind, MemFs, Profile, StorageError, StorageManager,
    StorageOptions,
};

type Fs = MemFs<32>;

const DEVICE: &str = "/config/device.bin";
const PROFILE_1: &str = "/config/profiles/1.bin";
const PROFILE_1_TMP: &str = "/config/profiles/1.bin.tmp";

fn named(name: &str) -> Profile {
    let mut profile = Profile::default();
    profile.set_name(name);
    profile
}

fn restart(storage: StorageManager<Fs>) -> StorageManager<Fs> {
    let mut fs = storage.into_inner();
    fs.power_cycle();
    StorageManager::new(fs, StorageOptions::default()).unwrap()
}

fn write_raw(fs: &mut Fs, path: &str, data: &[u8]) {
    let mut file = fs.create(path).unwrap();
    fs.write(&mut file, data).unwrap();
    fs.close(file).unwrap();
}

#[test]
fn test_records_survive_restart() {
    let mut storage = StorageManager::new(Fs::new(), StorageOptions::default()).unwrap();
    let config = DeviceConfig {
        active_profile: 1,
        ..DeviceConfig::default()
    };
    storage.save_device(&config).unwrap();
    storage.save_profile(1, &named("race")).unwrap();
    storage.close().unwrap();
    assert_eq!(storage.state(), MountState::Closed);
    assert_eq!(storage.load_device(), Err(StorageError::NotMounted));

    let mut storage = restart(storage);
    assert_eq!(storage.load_device().unwrap(), config);
    assert_eq!(storage.load_profile(1).unwrap().name(), Some("race"));
}

#[test]
fn test_power_cut_before_rename_keeps_old_record() {
    let mut storage = StorageManager::new(Fs::new(), StorageOptions::default()).unwrap();
    storage.save_profile(1, &named("old")).unwrap();

    storage.fs_mut().power_cut_after(FsOp::Sync);
    assert!(storage.save_profile(1, &named("new")).is_err());
    assert!(storage.fs_mut().exists(PROFILE_1_TMP));

    let mut storage = restart(storage);
    assert!(!storage.fs_mut().exists(PROFILE_1_TMP));
    assert_eq!(storage.load_profile(1).unwrap().name(), Some("old"));
}

#[test]
fn test_power_cut_between_remove_and_rename() {
    let mut storage = StorageManager::new(Fs::new(), StorageOptions::default()).unwrap();
    storage.save_profile(1, &named("old")).unwrap();

    // The first remove clears a stale temp file and fails with NotFound,
    // so the cut lands after the old record is removed.
    storage.fs_mut().power_cut_after(FsOp::Remove);
    assert!(storage.save_profile(1, &named("new")).is_err());

    let mut storage = restart(storage);
    assert!(!storage.fs_mut().exists(PROFILE_1_TMP));
    match storage.load_profile(1) {
        Ok(profile) => assert_eq!(profile.name(), Some("old")),
        Err(err) => assert_eq!(err, StorageError::NotFound),
    }
}

#[test]
fn test_failed_write_leaves_no_temp_file() {
    let mut storage = StorageManager::new(Fs::new(), StorageOptions::default()).unwrap();
    storage.save_profile(1, &named("old")).unwrap();

    storage.fs_mut().fail_next(FsOp::Rename, FsErrorKind::Other);
    assert_eq!(
        storage.save_profile(1, &named("new")),
        Err(StorageError::Filesystem(FsErrorKind::Other))
    );
    assert!(!storage.fs_mut().exists(PROFILE_1_TMP));
}

#[test]
fn test_stale_temp_files_removed_on_mount() {
    let mut fs = Fs::new();
    fs.mount().unwrap();
    fs.create_dir("/config").unwrap();
    fs.create_dir("/config/profiles").unwrap();
    write_raw(&mut fs, "/config/device.bin.tmp", &[0; 5]);
    for slot in 0..12 {
        let path = format!("/config/profiles/{slot}.bin.tmp");
        write_raw(&mut fs, &path, &[0; 3]);
    }
    write_raw(&mut fs, PROFILE_1, &named("kept").to_bytes());
    fs.unmount().unwrap();

    let mut storage = StorageManager::new(fs, StorageOptions::default()).unwrap();
    assert_eq!(storage.fs_mut().file_count(), 1);
    assert_eq!(storage.load_profile(1).unwrap().name(), Some("kept"));
}

#[test]
fn test_version_mismatch_wipes_everything() {
    let mut fs = Fs::new();
    fs.mount().unwrap();
    fs.create_dir("/config").unwrap();
    fs.create_dir("/config/profiles").unwrap();
    let foreign = DeviceConfig {
        version: 2,
        ..DeviceConfig::default()
    };
    write_raw(&mut fs, DEVICE, &foreign.to_bytes());
    write_raw(&mut fs, PROFILE_1, &named("gone").to_bytes());
    write_raw(&mut fs, "/config/profiles/9.bin", &named("gone").to_bytes());
    fs.unmount().unwrap();

    let mut storage = StorageManager::new(fs, StorageOptions::default()).unwrap();
    assert_eq!(storage.load_device(), Err(StorageError::NotFound));
    assert!(storage.list_profiles().unwrap().is_empty());
    assert_eq!(storage.fs_mut().file_count(), 0);
}

#[test]
fn test_matching_version_is_kept() {
    let mut storage = StorageManager::new(Fs::new(), StorageOptions::default()).unwrap();
    storage.save_device(&DeviceConfig::default()).unwrap();
    storage.save_profile(3, &named("stay")).unwrap();

    let mut storage = restart(storage);
    assert_eq!(&storage.list_profiles().unwrap()[..], &[3]);
    assert!(storage.load_device().is_ok());
}

#[test]
fn test_failed_wipe_fails_construction() {
    let mut fs = Fs::new();
    fs.mount().unwrap();
    fs.create_dir("/config").unwrap();
    fs.create_dir("/config/profiles").unwrap();
    let foreign = DeviceConfig {
        version: 7,
        ..DeviceConfig::default()
    };
    write_raw(&mut fs, DEVICE, &foreign.to_bytes());
    write_raw(&mut fs, PROFILE_1, &named("x").to_bytes());
    fs.unmount().unwrap();
    fs.fail_next(FsOp::Remove, FsErrorKind::Corrupt);

    assert!(StorageManager::new(fs, StorageOptions::default()).is_err());
}

#[test]
fn test_unformatted_volume() {
    let storage = StorageManager::new(Fs::unformatted(), StorageOptions::default()).unwrap();
    assert_eq!(storage.state(), MountState::Mounted);

    let strict = StorageOptions {
        format_on_failure: false,
    };
    assert!(StorageManager::new(Fs::unformatted(), strict).is_err());
}
