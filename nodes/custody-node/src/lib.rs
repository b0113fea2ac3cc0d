pub mod api;
mod config;

// std
use std::{collections::HashSet, sync::Arc};
// crates
use color_eyre::eyre::{bail, Result};
use custody_api::Backend;
use key_management_system::{
    backends::hsm::soft::SoftModule, Algorithm, BackendIndex, HsmBackend, SigningBackend,
    SoftwareBackend,
};
use tracing::info;
// internal
use crate::api::{http::AxumBackend, rpc::RpcBackend};
pub use crate::config::{
    BackendConfig, BackendKind, Config, HsmConfig, HttpArgs, LogArgs, LoggerLayerType,
    ModuleConfig, RpcArgs,
};

fn open_backend(kind: &BackendKind) -> Result<Arc<dyn SigningBackend>> {
    let backend: Arc<dyn SigningBackend> = match kind {
        BackendKind::Software => Arc::new(<SoftwareBackend>::new()),
        BackendKind::Hsm(HsmConfig {
            module: ModuleConfig::Soft,
            settings,
        }) => Arc::new(HsmBackend::new(SoftModule::new(), settings.clone())),
        #[cfg(feature = "pkcs11")]
        BackendKind::Hsm(HsmConfig {
            module: ModuleConfig::Pkcs11 { library, slot, pin },
            settings,
        }) => {
            use key_management_system::backends::hsm::pkcs11::Pkcs11Module;

            let module = Pkcs11Module::open(library, *slot, pin).map_err(|e| {
                color_eyre::eyre::eyre!("Could not open PKCS#11 module {}: {e}", library.display())
            })?;
            Arc::new(HsmBackend::new(module, settings.clone()))
        }
        #[cfg(not(feature = "pkcs11"))]
        BackendKind::Hsm(HsmConfig {
            module: ModuleConfig::Pkcs11 { .. },
            ..
        }) => bail!("PKCS#11 modules need the `pkcs11` feature"),
    };
    Ok(backend)
}

/// Opens every configured backend and routes it under its tag. Two backends
/// may not share a tag.
pub fn build_index(backends: &[BackendConfig]) -> Result<BackendIndex> {
    if backends.is_empty() {
        bail!("No signing backends configured");
    }
    let mut seen = HashSet::new();
    let mut builder = BackendIndex::builder();
    for config in backends {
        let backend = open_backend(&config.kind)?;
        let algorithm = config
            .algorithm
            .as_deref()
            .map(Algorithm::new)
            .unwrap_or_else(|| backend.algorithm());
        if !seen.insert(algorithm.clone()) {
            bail!("Algorithm {algorithm} is configured more than once");
        }
        info!(%algorithm, backend = %backend.algorithm(), "Signing backend ready");
        builder = builder.with_backend_for(algorithm, backend);
    }
    Ok(builder.build())
}

/// Serves both transports over one index until either fails or the process
/// is interrupted.
pub async fn run(config: Config) -> Result<()> {
    let index = Arc::new(build_index(&config.backends)?);
    let http = AxumBackend::new(config.http).await?;
    let rpc = RpcBackend::new(config.rpc).await?;

    tokio::select! {
        result = http.serve(Arc::clone(&index)) => result?,
        result = rpc.serve(Arc::clone(&index)) => result?,
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutting down");
        }
    }
    Ok(())
}
