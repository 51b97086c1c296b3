//! Filesystem jail for interpreter processes (Linux only)
//!
//! The parent lays out an empty root directory with mount points for the
//! system directories an interpreter needs and an empty `/work`. Between
//! fork and exec the child enters fresh user and mount namespaces (plus a
//! network namespace when asked), binds those directories read-only,
//! pivots into the tree and detaches the host root. Nothing else of the
//! host filesystem is reachable afterwards.
//!
//! Every step fails closed: if a namespace or mount cannot be set up the
//! exec never happens.

use std::ffi::{CStr, CString};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use tracing::debug;

/// Host directories bound read-only at the same path inside the jail.
/// Symlinked ones (merged `/usr`) are recreated as symlinks instead.
const SYSTEM_DIRS: &[&str] = &["/usr", "/bin", "/sbin", "/lib", "/lib32", "/lib64"];
const SYSTEM_FILES: &[&str] = &["/etc/ld.so.cache"];

/// `root/work` as seen from inside
const WORKDIR: &CStr = c"/work";

struct Bind {
    source: CString,
    target: CString,
    /// Flags the source mount carries that a read-only remount must keep
    locked: libc::c_ulong,
}

/// A prepared jail; enter it from the child with [`Jail::enter`].
pub struct Jail {
    root: CString,
    binds: Vec<Bind>,
    uid_map: String,
    gid_map: String,
    deny_network: bool,
}

fn c_path(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))
}

/// Mount flags of `path` that an unprivileged remount may not clear
fn locked_flags(path: &CStr) -> io::Result<libc::c_ulong> {
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    if unsafe { libc::statvfs(path.as_ptr(), &mut stat) } != 0 {
        return Err(io::Error::last_os_error());
    }

    let mut flags = 0;
    for (st, ms) in [
        (libc::ST_NOSUID, libc::MS_NOSUID),
        (libc::ST_NODEV, libc::MS_NODEV),
        (libc::ST_NOEXEC, libc::MS_NOEXEC),
        (libc::ST_NOATIME, libc::MS_NOATIME),
        (libc::ST_NODIRATIME, libc::MS_NODIRATIME),
        (libc::ST_RELATIME, libc::MS_RELATIME),
    ] {
        if stat.f_flag & st != 0 {
            flags |= ms;
        }
    }
    if stat.f_flag & (libc::ST_NOATIME | libc::ST_RELATIME) == 0 {
        flags |= libc::MS_STRICTATIME;
    }
    Ok(flags)
}

/// Installation prefix of an interpreter: `/opt/py/bin/python3` -> `/opt/py`
fn install_prefix(interpreter: &Path) -> Option<&Path> {
    let dir = interpreter.parent()?;
    let prefix = if dir.file_name().is_some_and(|name| name == "bin") {
        dir.parent()?
    } else {
        dir
    };
    (prefix != Path::new("/")).then_some(prefix)
}

impl Jail {
    /// Lay out the jail under `base` for running `interpreter`.
    ///
    /// `interpreter` must be canonical; it keeps the same path inside.
    pub fn prepare(base: &Path, interpreter: &Path, deny_network: bool) -> io::Result<Self> {
        let root = base.join("root");
        std::fs::create_dir(&root)?;
        std::fs::create_dir(root.join("work"))?;

        let mut jail = Self {
            root: c_path(&root)?,
            binds: Vec::new(),
            uid_map: format!("{0} {0} 1\n", unsafe { libc::getuid() }),
            gid_map: format!("{0} {0} 1\n", unsafe { libc::getgid() }),
            deny_network,
        };

        for dir in SYSTEM_DIRS {
            let host = Path::new(dir);
            let Ok(meta) = std::fs::symlink_metadata(host) else {
                continue;
            };
            let target = root.join(dir.trim_start_matches('/'));
            if meta.file_type().is_symlink() {
                std::os::unix::fs::symlink(std::fs::read_link(host)?, &target)?;
            } else if meta.is_dir() {
                std::fs::create_dir_all(&target)?;
                jail.bind(host, &target)?;
            }
        }

        for file in SYSTEM_FILES {
            let host = Path::new(file);
            if !host.is_file() {
                continue;
            }
            let target = root.join(file.trim_start_matches('/'));
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::File::create(&target)?;
            jail.bind(host, &target)?;
        }

        if let Some(prefix) = install_prefix(interpreter) {
            let covered = SYSTEM_DIRS.iter().any(|dir| prefix.starts_with(dir));
            if !covered {
                let target = root.join(prefix.strip_prefix("/").unwrap_or(prefix));
                std::fs::create_dir_all(&target)?;
                jail.bind(prefix, &target)?;
            }
        }

        debug!(root = %root.display(), binds = jail.binds.len(), "Prepared sandbox root");
        Ok(jail)
    }

    fn bind(&mut self, source: &Path, target: &Path) -> io::Result<()> {
        let source = c_path(source)?;
        let locked = locked_flags(&source)?;
        self.binds.push(Bind {
            source,
            target: c_path(target)?,
            locked,
        });
        Ok(())
    }

    /// Enter the jail. Only call this in the child between fork and exec:
    /// it performs raw syscalls and nothing that allocates.
    pub fn enter(&self) -> io::Result<()> {
        let mut namespaces = libc::CLONE_NEWUSER | libc::CLONE_NEWNS;
        if self.deny_network {
            namespaces |= libc::CLONE_NEWNET;
        }
        check(unsafe { libc::unshare(namespaces) })?;

        write_file(c"/proc/self/setgroups", b"deny")?;
        write_file(c"/proc/self/uid_map", self.uid_map.as_bytes())?;
        write_file(c"/proc/self/gid_map", self.gid_map.as_bytes())?;

        mount(None, c"/", libc::MS_REC | libc::MS_PRIVATE)?;
        // pivot_root needs the new root to be a mount point
        mount(Some(&self.root), &self.root, libc::MS_BIND | libc::MS_REC)?;

        for bind in &self.binds {
            mount(Some(&bind.source), &bind.target, libc::MS_BIND | libc::MS_REC)?;
            mount(
                None,
                &bind.target,
                libc::MS_BIND | libc::MS_REMOUNT | libc::MS_RDONLY | bind.locked,
            )?;
        }

        check(unsafe { libc::chdir(self.root.as_ptr()) })?;
        let here = c".";
        check(unsafe { libc::syscall(libc::SYS_pivot_root, here.as_ptr(), here.as_ptr()) } as libc::c_int)?;
        check(unsafe { libc::umount2(here.as_ptr(), libc::MNT_DETACH) })?;
        check(unsafe { libc::chdir(WORKDIR.as_ptr()) })?;
        Ok(())
    }
}

fn check(ret: libc::c_int) -> io::Result<()> {
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn mount(source: Option<&CStr>, target: &CStr, flags: libc::c_ulong) -> io::Result<()> {
    let source = source.map_or(std::ptr::null(), CStr::as_ptr);
    check(unsafe {
        libc::mount(
            source,
            target.as_ptr(),
            std::ptr::null(),
            flags,
            std::ptr::null(),
        )
    })
}

fn write_file(path: &CStr, contents: &[u8]) -> io::Result<()> {
    let fd = unsafe { libc::open(path.as_ptr(), libc::O_WRONLY | libc::O_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    let written = unsafe { libc::write(fd, contents.as_ptr().cast(), contents.len()) };
    let err = io::Error::last_os_error();
    unsafe { libc::close(fd) };
    if written < 0 || written as usize != contents.len() {
        return Err(err);
    }
    Ok(())
}
