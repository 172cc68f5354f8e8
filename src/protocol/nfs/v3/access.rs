//! NFSPROC3_ACCESS (procedure 4, RFC 1813 section 3.3.4): report which
//! of the requested access bits the caller would be granted.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{fattr3_from, resolve_handle};
use crate::protocol::rpc;
use crate::protocol::xdr::nfs3::file::{
    ACCESS3_DELETE, ACCESS3_EXECUTE, ACCESS3_EXTEND, ACCESS3_LOOKUP, ACCESS3_MODIFY, ACCESS3_READ,
};
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};
use crate::security::{PERM_EXEC, PERM_READ, PERM_WRITE};

pub async fn nfsproc3_access(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs3::file::ACCESS3args>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc3_access({xid}, {:#x})", args.access);

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let (path, stat) = match resolve_handle(context, &args.object.data, 0, "ACCESS").await {
        Ok(resolved) => resolved,
        Err(e) => {
            e.as_stat3().serialize(output)?;
            nfs3::post_op_attr::None.serialize(output)?;
            return Ok(());
        }
    };

    let allowed = |perm| context.security.check_access(&context.sec, &path, perm, &stat);
    let mut granted = 0;
    if args.access & ACCESS3_READ != 0 && allowed(PERM_READ) {
        granted |= ACCESS3_READ;
    }
    if args.access & ACCESS3_LOOKUP != 0 && stat.is_dir() && allowed(PERM_EXEC) {
        granted |= ACCESS3_LOOKUP;
    }
    if args.access & (ACCESS3_MODIFY | ACCESS3_EXTEND | ACCESS3_DELETE) != 0 && allowed(PERM_WRITE)
    {
        granted |= args.access & (ACCESS3_MODIFY | ACCESS3_EXTEND | ACCESS3_DELETE);
    }
    if args.access & ACCESS3_EXECUTE != 0 && !stat.is_dir() && allowed(PERM_EXEC) {
        granted |= ACCESS3_EXECUTE;
    }

    nfs3::nfsstat3::NFS3_OK.serialize(output)?;
    Some(fattr3_from(&stat)).serialize(output)?;
    granted.serialize(output)?;
    Ok(())
}
