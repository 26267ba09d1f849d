use anyhow::{Result, bail};
use tracing::info;

use crate::cli::ReviewArgs;

use super::open_existing_store;

pub fn run(args: ReviewArgs) -> Result<()> {
    let store = open_existing_store(&args.store)?;

    let updated = store.set_review(
        &args.promise,
        &args.motion,
        &args.algorithm_version,
        args.status,
        args.match_type,
    )?;
    if updated == 0 {
        bail!(
            "no {} match stored for promise {} and motion {}",
            args.algorithm_version,
            args.promise,
            args.motion
        );
    }
    store.touch()?;

    info!(
        promise_code = %args.promise,
        motion_id = %args.motion,
        algorithm_version = %args.algorithm_version,
        status = args.status.as_str(),
        match_type = args.match_type.map(|value| value.as_str()).unwrap_or("unchanged"),
        "recorded match review"
    );

    Ok(())
}
