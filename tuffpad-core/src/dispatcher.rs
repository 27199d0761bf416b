//! CommandDispatcher: maps decoded frames to responses.

use tuffpad_proto::{Command, Frame, Response, Status};

use crate::config::{DeviceConfig, Profile, Record, CURRENT_VERSION};
use crate::storage::{FileSystem, StorageError, StorageManager};

/// Reply to [`Command::Discover`].
pub const DISCOVER_REPLY: &[u8] = b"tuffpad";

/// Anything that can answer a request frame.
///
/// Implementations always produce a response; failures are reported as
/// response statuses.
pub trait FrameHandler {
    fn handle(&mut self, frame: &Frame) -> Response;
}

/// Firmware version reported by [`Command::GetVersion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl FirmwareVersion {
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

/// Executes configuration commands against a [`StorageManager`].
///
/// Built without storage (for example when the flash failed to mount), it
/// still answers `Ping`, `Discover` and `GetVersion`; every storage command
/// then returns [`Status::Error`].
pub struct CommandDispatcher<F: FileSystem> {
    storage: Option<StorageManager<F>>,
    version: FirmwareVersion,
}

impl<F: FileSystem> CommandDispatcher<F> {
    /// Create a dispatcher that persists through `storage`.
    pub fn new(storage: StorageManager<F>, version: FirmwareVersion) -> Self {
        Self {
            storage: Some(storage),
            version,
        }
    }

    /// Create a dispatcher with no usable storage.
    pub fn without_storage(version: FirmwareVersion) -> Self {
        Self {
            storage: None,
            version,
        }
    }

    /// Get a reference to the storage manager, if any.
    pub fn storage(&self) -> Option<&StorageManager<F>> {
        self.storage.as_ref()
    }

    /// Get a mutable reference to the storage manager, if any.
    pub fn storage_mut(&mut self) -> Option<&mut StorageManager<F>> {
        self.storage.as_mut()
    }

    /// Take the storage manager back, e.g. to close it.
    pub fn into_storage(self) -> Option<StorageManager<F>> {
        self.storage
    }

    fn get_version(&self) -> Response {
        let config = CURRENT_VERSION.to_le_bytes();
        respond(&[self.version.major, self.version.minor, config[0], config[1]])
    }

    /// Run a storage command, mapping its error to a response status.
    fn with_storage(
        &mut self,
        command: Command,
        op: impl FnOnce(&mut StorageManager<F>) -> Result<Response, StorageError>,
    ) -> Response {
        let Some(storage) = self.storage.as_mut() else {
            warn!("{:?} without storage", command);
            return Response::empty(Status::Error);
        };

        op(storage).unwrap_or_else(|err| {
            warn!("{:?} failed: {}", command, err);
            Response::empty(status_for(err))
        })
    }
}

impl<F: FileSystem> FrameHandler for CommandDispatcher<F> {
    fn handle(&mut self, frame: &Frame) -> Response {
        let Some(command) = frame.command() else {
            debug!("unknown command {}", frame.command);
            return Response::empty(Status::InvalidCmd);
        };

        let response = match command {
            Command::Ping => respond(&frame.payload),
            Command::Discover => respond(DISCOVER_REPLY),
            Command::GetVersion => self.get_version(),
            Command::GetDeviceConfig => self.with_storage(command, get_device_config),
            Command::SetDeviceConfig => {
                self.with_storage(command, |s| set_device_config(s, &frame.payload))
            }
            Command::GetProfile => self.with_storage(command, |s| get_profile(s, &frame.payload)),
            Command::SetProfile => self.with_storage(command, |s| set_profile(s, &frame.payload)),
            Command::DeleteProfile => {
                self.with_storage(command, |s| delete_profile(s, &frame.payload))
            }
            Command::ListProfiles => self.with_storage(command, list_profiles),
            Command::GetStorageStats => self.with_storage(command, storage_stats),
            Command::FactoryReset => self.with_storage(command, factory_reset),
        };
        debug!(
            "{:?} ({} bytes) -> {:?} ({} bytes)",
            command,
            frame.payload.len(),
            response.status,
            response.payload.len()
        );
        response
    }
}

fn status_for(err: StorageError) -> Status {
    match err {
        StorageError::NotFound => Status::NotFound,
        StorageError::NoSpace => Status::NoSpace,
        _ => Status::Error,
    }
}

/// `Ok` response carrying `payload`; payloads built here always fit a frame.
fn respond(payload: &[u8]) -> Response {
    Response::ok(payload).unwrap_or_else(|_| Response::empty(Status::Error))
}

fn invalid_data() -> Result<Response, StorageError> {
    Ok(Response::empty(Status::InvalidData))
}

fn single_slot(payload: &[u8]) -> Option<u8> {
    match payload {
        [slot] => Some(*slot),
        _ => None,
    }
}

fn get_device_config<F: FileSystem>(
    storage: &mut StorageManager<F>,
) -> Result<Response, StorageError> {
    let config = storage.load_device()?;
    Ok(respond(&config.to_bytes()))
}

fn set_device_config<F: FileSystem>(
    storage: &mut StorageManager<F>,
    payload: &[u8],
) -> Result<Response, StorageError> {
    let Ok(config) = DeviceConfig::decode(payload) else {
        return invalid_data();
    };
    storage.save_device(&config)?;
    Ok(Response::empty(Status::Ok))
}

fn get_profile<F: FileSystem>(
    storage: &mut StorageManager<F>,
    payload: &[u8],
) -> Result<Response, StorageError> {
    let Some(slot) = single_slot(payload) else {
        return invalid_data();
    };
    let profile = storage.load_profile(slot)?;
    Ok(respond(&profile.to_bytes()))
}

fn set_profile<F: FileSystem>(
    storage: &mut StorageManager<F>,
    payload: &[u8],
) -> Result<Response, StorageError> {
    let Some((&slot, record)) = payload.split_first() else {
        return invalid_data();
    };
    let Ok(profile) = Profile::decode(record) else {
        return invalid_data();
    };
    if profile.version != CURRENT_VERSION {
        return Ok(Response::empty(Status::VersionMismatch));
    }
    storage.save_profile(slot, &profile)?;
    Ok(Response::empty(Status::Ok))
}

fn delete_profile<F: FileSystem>(
    storage: &mut StorageManager<F>,
    payload: &[u8],
) -> Result<Response, StorageError> {
    let Some(slot) = single_slot(payload) else {
        return invalid_data();
    };
    storage.delete_profile(slot)?;
    Ok(Response::empty(Status::Ok))
}

/// `[count][slot...]`, ascending. At most 255 slots are reported so the
/// count byte always matches the list.
fn list_profiles<F: FileSystem>(
    storage: &mut StorageManager<F>,
) -> Result<Response, StorageError> {
    let slots = storage.list_profiles()?;
    let count = slots.len().min(usize::from(u8::MAX));

    let mut payload = [0u8; 256];
    payload[0] = count as u8;
    payload[1..=count].copy_from_slice(&slots[..count]);
    Ok(respond(&payload[..=count]))
}

/// `[total u32][used u32][free u32][count u8]`, all LE, each value clamped.
fn storage_stats<F: FileSystem>(
    storage: &mut StorageManager<F>,
) -> Result<Response, StorageError> {
    let stats = storage.stats()?;
    let clamp = |v: i64| v.clamp(0, i64::from(u32::MAX)) as u32;

    let mut payload = [0u8; 13];
    payload[0..4].copy_from_slice(&clamp(stats.total_space).to_le_bytes());
    payload[4..8].copy_from_slice(&clamp(stats.used_space).to_le_bytes());
    payload[8..12].copy_from_slice(&clamp(stats.free_space).to_le_bytes());
    payload[12] = u8::try_from(stats.profile_count).unwrap_or(u8::MAX);
    Ok(respond(&payload))
}

fn factory_reset<F: FileSystem>(
    storage: &mut StorageManager<F>,
) -> Result<Response, StorageError> {
    storage.force_wipe()?;
    info!("factory reset");
    Ok(Response::empty(Status::Ok))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KeyBinding, OutputType};
    use crate::storage::{FsErrorKind, FsOp, MemFs, StorageOptions};
    use tuffpad_proto::MAX_PAYLOAD_SIZE;

    type Fs = MemFs<32>;

    const VERSION: FirmwareVersion = FirmwareVersion::new(0, 1);

    fn dispatcher() -> CommandDispatcher<Fs> {
        let storage = StorageManager::new(Fs::new(), StorageOptions::default()).unwrap();
        CommandDispatcher::new(storage, VERSION)
    }

    fn request(
        dispatcher: &mut CommandDispatcher<Fs>,
        command: Command,
        payload: &[u8],
    ) -> Response {
        dispatcher.handle(&Frame::new(command, payload).unwrap())
    }

    fn profile_payload(slot: u8, name: &str) -> [u8; 287] {
        let mut profile = Profile::default();
        profile.set_name(name);
        profile.binding_count = 1;
        profile.bindings[0] = KeyBinding {
            output_type: OutputType::GamepadButton as u8,
            output_value: 3,
            ..KeyBinding::default()
        };
        let mut payload = [0u8; 287];
        payload[0] = slot;
        payload[1..].copy_from_slice(&profile.to_bytes());
        payload
    }

    #[test]
    fn test_unknown_command_is_invalid_cmd() {
        let mut dispatcher = dispatcher();
        let response = dispatcher.handle(&Frame::empty(0xFF));
        assert_eq!(response, Response::empty(Status::InvalidCmd));
    }

    #[test]
    fn test_ping_echoes_payload() {
        let mut dispatcher = dispatcher();
        let response = request(&mut dispatcher, Command::Ping, b"hello");
        assert_eq!(response.status, Status::Ok);
        assert_eq!(&response.payload[..], b"hello");
    }

    #[test]
    fn test_discover_and_version() {
        let mut dispatcher = dispatcher();
        let response = request(&mut dispatcher, Command::Discover, &[]);
        assert_eq!(&response.payload[..], b"tuffpad");

        let response = request(&mut dispatcher, Command::GetVersion, &[]);
        assert_eq!(response.status, Status::Ok);
        assert_eq!(&response.payload[..], &[0, 1, 1, 0]);
    }

    #[test]
    fn test_device_config_roundtrip() {
        let mut dispatcher = dispatcher();
        assert_eq!(
            request(&mut dispatcher, Command::GetDeviceConfig, &[]).status,
            Status::NotFound
        );

        let mut config = [0u8; 12];
        config[7] = 100; // brightness
        let response = request(&mut dispatcher, Command::SetDeviceConfig, &config);
        assert_eq!(response, Response::empty(Status::Ok));

        let response = request(&mut dispatcher, Command::GetDeviceConfig, &[]);
        assert_eq!(response.status, Status::Ok);
        assert_eq!(&response.payload[0..2], &[1, 0]);
        assert_eq!(response.payload[7], 100);
    }

    #[test]
    fn test_set_device_config_wrong_length() {
        let mut dispatcher = dispatcher();
        let response = request(&mut dispatcher, Command::SetDeviceConfig, &[1, 2, 3]);
        assert_eq!(response, Response::empty(Status::InvalidData));
    }

    #[test]
    fn test_profile_roundtrip() {
        let mut dispatcher = dispatcher();
        let payload = profile_payload(5, "TestProfile");
        assert_eq!(
            request(&mut dispatcher, Command::SetProfile, &payload).status,
            Status::Ok
        );

        let response = request(&mut dispatcher, Command::GetProfile, &[5]);
        assert_eq!(response.status, Status::Ok);
        assert_eq!(&response.payload[..], &payload[1..]);
        let profile = Profile::decode(&response.payload).unwrap();
        assert_eq!(profile.name(), Some("TestProfile"));
    }

    #[test]
    fn test_get_missing_profile() {
        let mut dispatcher = dispatcher();
        let response = request(&mut dispatcher, Command::GetProfile, &[99]);
        assert_eq!(response, Response::empty(Status::NotFound));
    }

    #[test]
    fn test_slot_payload_validation() {
        let mut dispatcher = dispatcher();
        for command in [Command::GetProfile, Command::DeleteProfile] {
            assert_eq!(request(&mut dispatcher, command, &[]).status, Status::InvalidData);
            assert_eq!(
                request(&mut dispatcher, command, &[1, 2]).status,
                Status::InvalidData
            );
        }
        assert_eq!(
            request(&mut dispatcher, Command::SetProfile, &[0; 286]).status,
            Status::InvalidData
        );
    }

    #[test]
    fn test_set_profile_version_mismatch() {
        let mut dispatcher = dispatcher();
        let mut payload = profile_payload(2, "old");
        payload[1] = 7;
        assert_eq!(
            request(&mut dispatcher, Command::SetProfile, &payload).status,
            Status::VersionMismatch
        );
        assert_eq!(
            request(&mut dispatcher, Command::GetProfile, &[2]).status,
            Status::NotFound
        );
    }

    #[test]
    fn test_set_profile_keeps_unknown_binding_types() {
        let mut dispatcher = dispatcher();
        let mut payload = profile_payload(5, "future");
        payload[1 + 30] = 0x07; // input type of binding 0
        payload[1 + 30 + 2] = 0x05; // output type of binding 0
        assert_eq!(
            request(&mut dispatcher, Command::SetProfile, &payload).status,
            Status::Ok
        );

        let response = request(&mut dispatcher, Command::GetProfile, &[5]);
        assert_eq!(response.status, Status::Ok);
        assert_eq!(&response.payload[..], &payload[1..]);
    }

    #[test]
    fn test_list_delete_and_stats() {
        let mut dispatcher = dispatcher();
        for slot in [9, 1, 4] {
            let payload = profile_payload(slot, "p");
            request(&mut dispatcher, Command::SetProfile, &payload);
        }

        let response = request(&mut dispatcher, Command::ListProfiles, &[]);
        assert_eq!(&response.payload[..], &[3, 1, 4, 9]);

        assert_eq!(
            request(&mut dispatcher, Command::DeleteProfile, &[4]).status,
            Status::Ok
        );
        // Idempotent
        assert_eq!(
            request(&mut dispatcher, Command::DeleteProfile, &[4]).status,
            Status::Ok
        );

        let response = request(&mut dispatcher, Command::GetStorageStats, &[]);
        assert_eq!(response.status, Status::Ok);
        let total = 256 * 1024u32;
        let used = 2 * 320 + 100u32;
        let mut expected = [0u8; 13];
        expected[0..4].copy_from_slice(&total.to_le_bytes());
        expected[4..8].copy_from_slice(&used.to_le_bytes());
        expected[8..12].copy_from_slice(&(total - used).to_le_bytes());
        expected[12] = 2;
        assert_eq!(&response.payload[..], &expected);
    }

    #[test]
    fn test_list_profiles_reports_at_most_255_slots() {
        let storage = StorageManager::new(MemFs::<260>::new(), StorageOptions::default()).unwrap();
        let mut dispatcher = CommandDispatcher::new(storage, VERSION);
        let profile = Profile::default();
        for slot in 0..=u8::MAX {
            dispatcher
                .storage_mut()
                .unwrap()
                .save_profile(slot, &profile)
                .unwrap();
        }

        let response = dispatcher.handle(&Frame::empty(Command::ListProfiles));
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.payload.len(), 256);
        assert!(response.payload.len() <= MAX_PAYLOAD_SIZE);
        assert_eq!(response.payload[0], 255);
        // The highest slot is the one left out
        assert!(response.payload[1..].iter().copied().eq(0..u8::MAX));
    }

    #[test]
    fn test_factory_reset() {
        let mut dispatcher = dispatcher();
        request(&mut dispatcher, Command::SetDeviceConfig, &[0; 12]);
        request(&mut dispatcher, Command::SetProfile, &profile_payload(0, "x"));

        assert_eq!(
            request(&mut dispatcher, Command::FactoryReset, &[]).status,
            Status::Ok
        );
        assert_eq!(
            request(&mut dispatcher, Command::GetDeviceConfig, &[]).status,
            Status::NotFound
        );
        assert_eq!(
            &request(&mut dispatcher, Command::ListProfiles, &[]).payload[..],
            &[0]
        );
    }

    #[test]
    fn test_storage_faults_map_to_status() {
        let mut dispatcher = dispatcher();
        let fs = dispatcher.storage_mut().unwrap().fs_mut();
        fs.fail_next(FsOp::ReadDir, FsErrorKind::Corrupt);
        assert_eq!(
            request(&mut dispatcher, Command::ListProfiles, &[]),
            Response::empty(Status::Error)
        );

        let fs = dispatcher.storage_mut().unwrap().fs_mut();
        fs.fail_next(FsOp::Create, FsErrorKind::NoSpace);
        assert_eq!(
            request(&mut dispatcher, Command::SetDeviceConfig, &[0; 12]),
            Response::empty(Status::NoSpace)
        );
    }

    #[test]
    fn test_without_storage() {
        let mut dispatcher = CommandDispatcher::<Fs>::without_storage(VERSION);
        assert_eq!(request(&mut dispatcher, Command::Ping, b"x").status, Status::Ok);
        assert_eq!(
            request(&mut dispatcher, Command::Discover, &[]).status,
            Status::Ok
        );
        assert_eq!(
            request(&mut dispatcher, Command::GetVersion, &[]).status,
            Status::Ok
        );
        for command in [
            Command::GetDeviceConfig,
            Command::ListProfiles,
            Command::GetStorageStats,
            Command::FactoryReset,
        ] {
            assert_eq!(request(&mut dispatcher, command, &[]).status, Status::Error);
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(StorageError::NotFound), Status::NotFound);
        assert_eq!(status_for(StorageError::NoSpace), Status::NoSpace);
        assert_eq!(status_for(StorageError::Corrupted), Status::Error);
        assert_eq!(
            status_for(StorageError::Filesystem(FsErrorKind::Other)),
            Status::Error
        );
    }
}
