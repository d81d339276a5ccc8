use anyhow::Result;

use super::{HostKernel, SyscallCtx};

/// Largest single host transfer; longer requests become short reads/writes.
const MAX_IO: usize = 0x10_0000;

/// Linux `UIO_MAXIOV`.
const IOV_MAX: usize = 1024;

const EFAULT: i64 = -(libc::EFAULT as i64);

impl HostKernel {
    /// read(fd, buf, count)
    pub(super) fn sys_read(ctx: &mut SyscallCtx<'_>) -> Result<i64> {
        let (fd, buf, count): (i32, u64, usize) = ctx.args()?;
        let mut host = vec![0u8; count.min(MAX_IO)];

        let result = unsafe { libc::read(fd, host.as_mut_ptr().cast(), host.len()) as i64 };
        let result = Self::libc_to_kernel(result);
        if result > 0 && ctx.write_bytes(buf, &host[..result as usize]).is_err() {
            return Ok(EFAULT);
        }
        Ok(result)
    }

    /// write(fd, buf, count)
    pub(super) fn sys_write(ctx: &mut SyscallCtx<'_>) -> Result<i64> {
        let (fd, buf, count): (i32, u64, usize) = ctx.args()?;
        let Ok(data) = ctx.read_bytes(buf, count.min(MAX_IO)) else {
            return Ok(EFAULT);
        };

        let result = unsafe { libc::write(fd, data.as_ptr().cast(), data.len()) as i64 };
        Ok(Self::libc_to_kernel(result))
    }

    /// writev(fd, iov, iovcnt)
    ///
    /// The guest iovecs are gathered into one buffer and written with a
    /// single host write.
    pub(super) fn sys_writev(ctx: &mut SyscallCtx<'_>) -> Result<i64> {
        let (fd, iov, iovcnt): (i32, u64, usize) = ctx.args()?;
        if iovcnt > IOV_MAX {
            return Ok(-(libc::EINVAL as i64));
        }

        let word = ctx.arch().word_size();
        let mut data = Vec::new();
        for i in 0..iovcnt as u64 {
            let entry = iov + i * word * 2;
            let (Ok(base), Ok(len)) = (ctx.read_word(entry), ctx.read_word(entry + word)) else {
                return Ok(EFAULT);
            };
            let len = (len as usize).min(MAX_IO.saturating_sub(data.len()));
            let Ok(chunk) = ctx.read_bytes(base, len) else {
                return Ok(EFAULT);
            };
            data.extend_from_slice(&chunk);
        }

        let result = unsafe { libc::write(fd, data.as_ptr().cast(), data.len()) as i64 };
        Ok(Self::libc_to_kernel(result))
    }
}
