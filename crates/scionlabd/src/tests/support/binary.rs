//! A stand-in for the multi-call SCION binary.

use std::fs;
use std::os::unix::fs::PermissionsExt;

use camino::{Utf8Path, Utf8PathBuf};

/// Writes an executable script under `root` that answers the version query
/// and prints each role's readiness line before sleeping. The daemon role
/// writes its line to the daemon log file instead of stdout, and the ping
/// tool answers exactly once.
pub fn fake_scion_binary(root: &Utf8Path) -> Utf8PathBuf {
    let path = root.join("bin").join("scion");
    let daemon_log = root.join("logs").join("daemon.log");
    let script = format!(
        "#!/bin/sh
case \"$1\" in
  version) echo 'scion v0.10.0'; exit 0 ;;
  dispatcher) echo '[INFO] Service started SCION Dispatcher' ;;
  border) echo '[INFO] Service started SCION Router' ;;
  cs) echo '[INFO] Started periodic tasks' ;;
  sciond) sleep 0.2; echo '[INFO] Service started SCION Daemon' >> '{daemon_log}' ;;
  scion) echo '64 bytes from 17-ffaa:0:1,[10.0.0.1]: scmp_seq=0 time=1ms' ;;
esac
exec sleep 30
"
    );
    fs::create_dir_all(root.join("bin")).expect("failed to create bin directory");
    fs::write(&path, script).expect("failed to write fake SCION binary");
    let mut permissions = fs::metadata(&path)
        .expect("fake binary metadata")
        .permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).expect("failed to mark fake binary executable");
    path
}
