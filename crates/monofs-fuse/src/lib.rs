//! Kernel filesystem adapter for monofs, backed by `fuser`.
//!
//! Compiled only on Linux with the `fuse` feature; every other build
//! sees an empty crate. The adapter owns handle-id assignment and the
//! errno mapping; all semantics live in `monofs-fs`.

#[cfg(all(feature = "fuse", target_os = "linux"))]
mod imp {
    use std::ffi::OsStr;
    use std::path::Path;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use fuser::{
        FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyCreate, ReplyData,
        ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
        TimeOrNow,
    };

    use monofs_fs::{Monofs, SetAttrPatch};
    use monofs_metadb::{FileKind, InodeAttributes};
    use monofs_types::{FsError, InodeId, Result};

    const TTL: Duration = Duration::from_secs(1);
    const BLOCK_SIZE: u32 = 4096;
    const NAME_MAX: u32 = 255;

    pub struct MonoFuse {
        fs: Arc<Monofs>,
        next_handle: AtomicU64,
    }

    impl MonoFuse {
        pub fn new(fs: Arc<Monofs>) -> Self {
            Self {
                fs,
                next_handle: AtomicU64::new(1),
            }
        }

        /// Mount and serve until the kernel unmounts us.
        pub fn mount(self, mountpoint: &Path, read_only: bool) -> std::io::Result<()> {
            let mut options = vec![
                MountOption::FSName(self.fs.name().to_string()),
                MountOption::DefaultPermissions,
            ];
            if read_only {
                options.push(MountOption::RO);
            }
            fuser::mount2(self, mountpoint, &options)
        }

        fn alloc_handle(&self) -> u64 {
            self.next_handle.fetch_add(1, Ordering::Relaxed)
        }

        fn attr_of(&self, ino: InodeId) -> Result<FileAttr> {
            Ok(to_file_attr(ino, &self.fs.get_inode_attributes(ino)?))
        }
    }

    fn ns_to_time(ns: i64) -> SystemTime {
        if ns <= 0 {
            UNIX_EPOCH
        } else {
            UNIX_EPOCH + Duration::from_nanos(ns as u64)
        }
    }

    fn time_to_ns(t: SystemTime) -> i64 {
        t.duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0)
    }

    fn time_or_now_ns(t: TimeOrNow) -> i64 {
        match t {
            TimeOrNow::SpecificTime(t) => time_to_ns(t),
            TimeOrNow::Now => time_to_ns(SystemTime::now()),
        }
    }

    fn to_file_type(kind: FileKind) -> FileType {
        match kind {
            FileKind::File => FileType::RegularFile,
            FileKind::Directory => FileType::Directory,
            FileKind::Symlink => FileType::Symlink,
            FileKind::Other => FileType::RegularFile,
        }
    }

    fn to_file_attr(ino: InodeId, attrs: &InodeAttributes) -> FileAttr {
        FileAttr {
            ino,
            size: attrs.size,
            blocks: attrs.size.div_ceil(BLOCK_SIZE as u64),
            atime: ns_to_time(attrs.atime_ns),
            mtime: ns_to_time(attrs.mtime_ns),
            ctime: ns_to_time(attrs.ctime_ns),
            crtime: ns_to_time(attrs.ctime_ns),
            kind: to_file_type(attrs.kind()),
            perm: (attrs.mode & 0o7777) as u16,
            nlink: attrs.nlink,
            uid: attrs.uid,
            gid: attrs.gid,
            rdev: attrs.rdev,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    fn name_str(name: &OsStr) -> Option<&str> {
        name.to_str()
    }

    impl Filesystem for MonoFuse {
        fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
            let Some(name) = name_str(name) else {
                reply.error(libc::ENOENT);
                return;
            };
            match self.fs.lookup(parent, name) {
                Ok(inode) => reply.entry(&TTL, &to_file_attr(inode.id, &inode.attrs), 0),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
            match self.attr_of(ino) {
                Ok(attr) => reply.attr(&TTL, &attr),
                Err(e) => reply.error(e.errno()),
            }
        }

        #[allow(clippy::too_many_arguments)]
        fn setattr(
            &mut self,
            _req: &Request,
            ino: u64,
            mode: Option<u32>,
            uid: Option<u32>,
            gid: Option<u32>,
            size: Option<u64>,
            atime: Option<TimeOrNow>,
            mtime: Option<TimeOrNow>,
            _ctime: Option<SystemTime>,
            _fh: Option<u64>,
            _crtime: Option<SystemTime>,
            _chgtime: Option<SystemTime>,
            _bkuptime: Option<SystemTime>,
            _flags: Option<u32>,
            reply: ReplyAttr,
        ) {
            let patch = SetAttrPatch {
                mode,
                uid,
                gid,
                size,
                atime_ns: atime.map(time_or_now_ns),
                mtime_ns: mtime.map(time_or_now_ns),
            };
            match self.fs.set_inode_attributes(ino, patch) {
                Ok(attrs) => reply.attr(&TTL, &to_file_attr(ino, &attrs)),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn mkdir(
            &mut self,
            _req: &Request,
            parent: u64,
            name: &OsStr,
            mode: u32,
            _umask: u32,
            reply: ReplyEntry,
        ) {
            let Some(name) = name_str(name) else {
                reply.error(libc::EINVAL);
                return;
            };
            match self.fs.mkdir(parent, name, mode) {
                Ok(inode) => reply.entry(&TTL, &to_file_attr(inode.id, &inode.attrs), 0),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
            let Some(name) = name_str(name) else {
                reply.error(libc::ENOENT);
                return;
            };
            match self.fs.rmdir(parent, name) {
                Ok(()) => reply.ok(),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
            let Some(name) = name_str(name) else {
                reply.error(libc::ENOENT);
                return;
            };
            match self.fs.unlink(parent, name) {
                Ok(()) => reply.ok(),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn symlink(
            &mut self,
            _req: &Request,
            parent: u64,
            name: &OsStr,
            link: &Path,
            reply: ReplyEntry,
        ) {
            let (Some(name), Some(target)) = (name_str(name), link.to_str()) else {
                reply.error(libc::EINVAL);
                return;
            };
            match self.fs.create_symlink(parent, name, target) {
                Ok(inode) => reply.entry(&TTL, &to_file_attr(inode.id, &inode.attrs), 0),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
            match self.fs.read_symlink(ino) {
                Ok(target) => reply.data(target.as_bytes()),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn link(
            &mut self,
            _req: &Request,
            ino: u64,
            newparent: u64,
            newname: &OsStr,
            reply: ReplyEntry,
        ) {
            let Some(name) = name_str(newname) else {
                reply.error(libc::EINVAL);
                return;
            };
            match self.fs.create_link(newparent, name, ino) {
                Ok(inode) => reply.entry(&TTL, &to_file_attr(inode.id, &inode.attrs), 0),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn rename(
            &mut self,
            _req: &Request,
            parent: u64,
            name: &OsStr,
            newparent: u64,
            newname: &OsStr,
            _flags: u32,
            reply: ReplyEmpty,
        ) {
            let (Some(old), Some(new)) = (name_str(name), name_str(newname)) else {
                reply.error(libc::EINVAL);
                return;
            };
            match self.fs.rename(parent, old, newparent, new) {
                Ok(()) => reply.ok(),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn create(
            &mut self,
            _req: &Request,
            parent: u64,
            name: &OsStr,
            mode: u32,
            _umask: u32,
            _flags: i32,
            reply: ReplyCreate,
        ) {
            let Some(name) = name_str(name) else {
                reply.error(libc::EINVAL);
                return;
            };
            let fh = self.alloc_handle();
            match self.fs.create_file(parent, name, mode, fh) {
                Ok(inode) => {
                    reply.created(&TTL, &to_file_attr(inode.id, &inode.attrs), 0, fh, 0)
                }
                Err(e) => reply.error(e.errno()),
            }
        }

        fn open(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
            let fh = self.alloc_handle();
            match self.fs.open_file(ino, fh) {
                Ok(()) => reply.opened(fh, 0),
                Err(e) => reply.error(e.errno()),
            }
        }

        #[allow(clippy::too_many_arguments)]
        fn read(
            &mut self,
            _req: &Request,
            _ino: u64,
            fh: u64,
            offset: i64,
            size: u32,
            _flags: i32,
            _lock_owner: Option<u64>,
            reply: ReplyData,
        ) {
            match self.fs.read_file(fh, offset.max(0) as u64, size as u64) {
                Ok(data) => reply.data(&data),
                Err(e) => reply.error(e.errno()),
            }
        }

        #[allow(clippy::too_many_arguments)]
        fn write(
            &mut self,
            _req: &Request,
            ino: u64,
            fh: u64,
            offset: i64,
            data: &[u8],
            _write_flags: u32,
            _flags: i32,
            _lock_owner: Option<u64>,
            reply: ReplyWrite,
        ) {
            let offset = offset.max(0) as u64;
            match self.fs.write_file(fh, offset, data) {
                Ok(written) => {
                    // Keep the recorded size in step with the write; the
                    // data engine itself never touches inode metadata.
                    let end = offset + written as u64;
                    let grew = self
                        .fs
                        .get_inode_attributes(ino)
                        .map(|attrs| attrs.size < end)
                        .unwrap_or(false);
                    if grew {
                        if let Err(e) = self.fs.set_inode_attributes(
                            ino,
                            SetAttrPatch {
                                size: Some(end),
                                ..SetAttrPatch::default()
                            },
                        ) {
                            reply.error(e.errno());
                            return;
                        }
                    }
                    reply.written(written as u32);
                }
                Err(e) => reply.error(e.errno()),
            }
        }

        fn flush(&mut self, _req: &Request, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
            match self.fs.flush_file(fh) {
                Ok(()) => reply.ok(),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn fsync(&mut self, _req: &Request, _ino: u64, fh: u64, _datasync: bool, reply: ReplyEmpty) {
            match self.fs.sync_file(fh) {
                Ok(()) => reply.ok(),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn release(
            &mut self,
            _req: &Request,
            _ino: u64,
            fh: u64,
            _flags: i32,
            _lock_owner: Option<u64>,
            _flush: bool,
            reply: ReplyEmpty,
        ) {
            match self.fs.release_handle(fh) {
                Ok(()) => reply.ok(),
                Err(FsError::InvalidHandle(_)) => reply.ok(),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn readdir(
            &mut self,
            _req: &Request,
            ino: u64,
            _fh: u64,
            offset: i64,
            mut reply: ReplyDirectory,
        ) {
            let attrs = match self.fs.get_inode_attributes(ino) {
                Ok(attrs) => attrs,
                Err(e) => {
                    reply.error(e.errno());
                    return;
                }
            };
            let children = match self.fs.read_dir(ino) {
                Ok(children) => children,
                Err(e) => {
                    reply.error(e.errno());
                    return;
                }
            };

            let mut entries: Vec<(u64, FileType, String)> = vec![
                (ino, FileType::Directory, ".".to_string()),
                (attrs.parent, FileType::Directory, "..".to_string()),
            ];
            entries.extend(
                children
                    .into_iter()
                    .map(|d| (d.inode_id, to_file_type(d.kind), d.name)),
            );

            for (i, (ino, kind, name)) in
                entries.into_iter().enumerate().skip(offset.max(0) as usize)
            {
                if reply.add(ino, (i + 1) as i64, kind, &name) {
                    break;
                }
            }
            reply.ok();
        }

        fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
            match self.fs.statfs() {
                Ok(stat) => reply.statfs(
                    stat.blocks,
                    stat.blocks_free,
                    stat.blocks_available,
                    0,
                    0,
                    stat.block_size,
                    NAME_MAX,
                    stat.block_size,
                ),
                Err(e) => reply.error(e.errno()),
            }
        }
    }
}

#[cfg(all(feature = "fuse", target_os = "linux"))]
pub use imp::MonoFuse;
