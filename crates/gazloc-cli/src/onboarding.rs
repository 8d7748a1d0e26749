use gazloc_cache::FileCacheStore;

/// Show the onboarding flag, setting or clearing it first when asked.
///
/// # Errors
///
/// Returns an error if the flag cannot be read or written.
pub(crate) async fn run_onboarding(
    store: &FileCacheStore,
    complete: bool,
    reset: bool,
) -> anyhow::Result<()> {
    if complete || reset {
        store.set_onboarding_complete(complete).await?;
        tracing::info!(complete, dir = %store.dir().display(), "onboarding flag updated");
    }

    let done = store.is_onboarding_complete().await?;
    println!("onboarding {}", if done { "complete" } else { "pending" });
    Ok(())
}
