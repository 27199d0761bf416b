//! The storage manager on top of the NOR flash filesystem.

mod common;

use common::{Flash, FLASH_SECTOR_SIZE};
use tuffpad_core::storage::NorFsError;
use tuffpad_core::{
    DeviceConfig, FileSystem, FsError, FsErrorKind, NorFlashFs, Profile, StorageError,
    StorageManager, StorageOptions,
};

type Storage = StorageManager<NorFlashFs<Flash>>;

fn named(name: &str) -> Profile {
    let mut profile = Profile::default();
    profile.set_name(name);
    profile
}

fn boot(flash: Flash) -> Storage {
    StorageManager::new(NorFlashFs::new(flash).unwrap(), StorageOptions::default()).unwrap()
}

fn power_off(storage: Storage) -> Flash {
    let mut flash = storage.into_inner().into_inner();
    flash.disable_faults();
    flash
}

#[test]
fn test_geometry_rejected() {
    assert!(matches!(
        NorFlashFs::new(Flash::new(1)),
        Err(NorFsError::Geometry)
    ));
}

#[test]
fn test_blank_flash_is_formatted() {
    let flash = Flash::new(8);
    let mut fs = NorFlashFs::new(flash).unwrap();
    assert_eq!(fs.mount().unwrap_err().kind(), FsErrorKind::Corrupt);

    let mut storage = StorageManager::new(fs, StorageOptions::default()).unwrap();
    assert_eq!(storage.stats().unwrap().total_space, 7 * FLASH_SECTOR_SIZE as i64);
    assert!(storage.list_profiles().unwrap().is_empty());
}

#[test]
fn test_records_survive_power_cycle() {
    let mut storage = boot(Flash::new(8));
    let config = DeviceConfig {
        active_profile: 2,
        brightness: 40,
        ..DeviceConfig::default()
    };
    storage.save_device(&config).unwrap();
    storage.save_profile(2, &named("drive")).unwrap();
    storage.save_profile(0, &named("menu")).unwrap();
    storage.save_profile(2, &named("drift")).unwrap();

    let mut storage = boot(power_off(storage));
    assert_eq!(storage.load_device().unwrap(), config);
    assert_eq!(&storage.list_profiles().unwrap()[..], &[0, 2]);
    assert_eq!(storage.load_profile(2).unwrap().name(), Some("drift"));
    assert_eq!(storage.load_profile(0).unwrap().name(), Some("menu"));

    storage.delete_profile(0).unwrap();
    let mut storage = boot(power_off(storage));
    assert_eq!(&storage.list_profiles().unwrap()[..], &[2]);
}

#[test]
fn test_out_of_sectors() {
    // Three file sectors: a write needs one spare for its temp file
    let mut storage = boot(Flash::new(4));
    storage.save_profile(0, &named("a")).unwrap();
    storage.save_profile(1, &named("b")).unwrap();
    storage.save_profile(2, &named("c")).unwrap();
    assert_eq!(
        storage.save_profile(3, &named("d")),
        Err(StorageError::NoSpace)
    );
    assert_eq!(storage.list_profiles().unwrap().len(), 3);
}

#[test]
fn test_unfinished_file_is_invisible() {
    let mut flash = Flash::new(8);
    // File magic of the first file sector
    flash.fail_write_at = Some(FLASH_SECTOR_SIZE as u32);
    let mut storage = boot(flash);

    assert!(storage.save_device(&DeviceConfig::default()).is_err());
    assert_eq!(storage.load_device(), Err(StorageError::NotFound));

    let mut storage = boot(power_off(storage));
    assert_eq!(storage.load_device(), Err(StorageError::NotFound));
    storage.save_device(&DeviceConfig::default()).unwrap();
    assert!(storage.load_device().is_ok());
}

#[test]
fn test_rename_takes_effect_on_commit() {
    let mut fs = NorFlashFs::new(Flash::new(4)).unwrap();
    fs.format().unwrap();
    fs.mount().unwrap();

    let mut file = fs.create("/a.tmp").unwrap();
    fs.write(&mut file, b"payload").unwrap();
    fs.close(file).unwrap();

    // Commit word of the first file sector
    fs.flash_mut().fail_write_at = Some(FLASH_SECTOR_SIZE as u32 + 4);
    assert!(fs.rename("/a.tmp", "/a").is_err());
    assert_eq!(fs.open("/a").unwrap_err().kind(), FsErrorKind::NotFound);
    assert!(fs.open("/a.tmp").is_ok());

    fs.flash_mut().disable_faults();
    let mut fs = NorFlashFs::new(fs.into_inner()).unwrap();
    fs.mount().unwrap();
    let mut names = Vec::new();
    fs.read_dir("/", &mut |name| names.push(name.to_string()))
        .unwrap();
    assert_eq!(names, ["a.tmp"]);
}

#[test]
fn test_rename_does_not_replace() {
    let mut fs = NorFlashFs::new(Flash::new(4)).unwrap();
    fs.format().unwrap();
    fs.mount().unwrap();
    for path in ["/x", "/y"] {
        let file = fs.create(path).unwrap();
        fs.close(file).unwrap();
    }
    assert_eq!(
        fs.rename("/x", "/y").unwrap_err().kind(),
        FsErrorKind::AlreadyExists
    );
}

#[test]
fn test_power_loss_at_every_step() {
    let mut step = 0;
    loop {
        let mut storage = boot(Flash::new(8));
        storage.save_profile(1, &named("old")).unwrap();

        let flash = storage.fs_mut().flash_mut();
        flash.fail_after_operation = flash.operations.len() + step;
        let finished = storage.save_profile(1, &named("new")).is_ok();

        let mut storage = boot(power_off(storage));
        match storage.load_profile(1) {
            Ok(profile) => {
                let name = profile.name().unwrap().to_string();
                assert!(name == "old" || name == "new", "step {step}: {name}");
                if finished {
                    assert_eq!(name, "new");
                }
            }
            Err(err) => assert_eq!(err, StorageError::NotFound, "step {step}"),
        }

        if finished {
            break;
        }
        step += 1;
    }
}
