//! PMAPPROC_CALLIT (procedure 5): indirect call forwarding.
//!
//! Restricted to the NULL procedure of locally registered programs so
//! the server cannot be used as a traffic reflector. Any other target
//! answers with port zero and empty results rather than an error, per
//! the procedure's fire-and-forget semantics.

use std::io::{Read, Write};

use tracing::{debug, warn};

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, portmap, Serialize};

const PMAP_NULL_PROC: u32 = 0;

pub fn pmapproc_callit(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let args = match deserialize::<portmap::call_args>(input) {
        Ok(args) => args,
        Err(_) => {
            xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
            return Ok(());
        }
    };
    debug!("pmapproc_callit({xid}, prog={}, vers={}, proc={})", args.prog, args.vers, args.proc);

    let mut result = portmap::call_result::default();
    if args.proc == PMAP_NULL_PROC && context.portmap.is_registered(args.prog, args.vers) {
        // NULL of a registered program: answer for it directly. The
        // reply of a NULL procedure is empty.
        result.port = context.portmap.get_port(args.prog, args.vers, portmap::IPPROTO_UDP) as u32;
        if result.port == 0 {
            result.port =
                context.portmap.get_port(args.prog, args.vers, portmap::IPPROTO_TCP) as u32;
        }
    } else {
        warn!(
            "refusing CALLIT to prog={} vers={} proc={}",
            args.prog, args.vers, args.proc
        );
    }

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    result.serialize(output)?;
    Ok(())
}
