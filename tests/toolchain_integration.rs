//! Resolver determinism and environment routing through the stage catalogue.

mod common;

use proptest::prelude::*;
use std::sync::Arc;

use common::MaterializingDispatcher;
use cvforge::config::ForgeSettings;
use cvforge::models::{Architecture, BuildTarget, ExecutionEnvironment, RuntimeEnvironment};
use cvforge::orchestrator::phases;
use cvforge::orchestrator::{ArtifactStore, AutoConfirm, Pipeline, StageRunner};
use cvforge::system::{ContainerSpec, ProcessDispatcher};
use cvforge::toolchain::ToolchainResolver;

fn arch_strategy() -> impl Strategy<Value = Architecture> {
    prop_oneof![
        Just(Architecture::X86),
        Just(Architecture::Arm),
        Just(Architecture::Arm64),
    ]
}

fn runtime_strategy() -> impl Strategy<Value = RuntimeEnvironment> {
    prop_oneof![
        Just(RuntimeEnvironment::HostAndroidBuild),
        Just(RuntimeEnvironment::DeviceTermuxBuild),
    ]
}

proptest! {
    #[test]
    fn resolve_is_deterministic(
        arch in arch_strategy(),
        api in 16u32..=34,
        runtime in runtime_strategy(),
    ) {
        let target = BuildTarget::new(arch, api, runtime).unwrap();
        let resolver = ToolchainResolver::new("/ws", ForgeSettings::default());
        for (stage, _) in phases::stage_var_groups() {
            let first = resolver.resolve(&target, stage).unwrap();
            let second = resolver.resolve(&target, stage).unwrap();
            prop_assert_eq!(first, second);
        }
    }

    #[test]
    fn triples_never_collide_across_architectures(api in 16u32..=34) {
        let resolver = ToolchainResolver::new("/ws", ForgeSettings::default());
        let mut triples = Vec::new();
        let mut toolchains = Vec::new();
        for arch in Architecture::ALL {
            let target = BuildTarget::new(arch, api, RuntimeEnvironment::HostAndroidBuild).unwrap();
            let env = resolver.resolve(&target, phases::STANDALONE_TOOLCHAIN).unwrap();
            triples.push(env.get("TOOLCHAIN_TRIPLE").unwrap().to_string());
            toolchains.push(env.get("TOOLCHAIN_DIR").unwrap().to_string());
        }
        triples.sort();
        triples.dedup();
        toolchains.sort();
        toolchains.dedup();
        prop_assert_eq!(triples.len(), 3);
        prop_assert_eq!(toolchains.len(), 3);
    }
}

#[test]
fn test_container_stages_run_inside_the_image() {
    let settings = ForgeSettings::default();
    let target =
        BuildTarget::new(Architecture::Arm, 26, RuntimeEnvironment::HostAndroidBuild).unwrap();
    let runner = StageRunner::new(
        ArtifactStore::new("/home/dev/ws"),
        ToolchainResolver::new("/home/dev/ws", settings.clone()),
        MaterializingDispatcher::new(),
        Arc::new(AutoConfirm),
    );
    let dispatcher = ProcessDispatcher::new(ContainerSpec {
        runtime: settings.container_runtime.clone(),
        image: format!("dockcross/{}", settings.dockcross_image),
        host_root: "/home/dev/ws".into(),
        mount: settings.container_mount.clone(),
    });
    let pipeline = Pipeline::for_target(&target, &settings).unwrap();
    let plan = pipeline.plan(&runner, &target).unwrap();

    let numpy = plan
        .iter()
        .find(|stage| stage.name == phases::BUILD_NUMPY)
        .unwrap();
    assert_eq!(numpy.environment, ExecutionEnvironment::Container);
    let invocation = dispatcher
        .host_invocation(
            numpy.environment,
            &numpy.commands[1],
            &numpy.working_dir,
            &numpy.exports,
        )
        .unwrap();
    assert_eq!(&invocation[..3], &["docker", "run", "--rm"]);
    assert!(invocation.contains(&"/home/dev/ws:/work".to_string()));
    assert!(invocation.contains(&"dockcross/linux-x86".to_string()));
    assert!(invocation
        .iter()
        .any(|arg| arg.starts_with("CC=/work/toolchain-26-arm/bin/")));
    assert!(!invocation.iter().any(|arg| arg.contains("/home/dev/ws/")));
    assert_eq!(
        &invocation[invocation.len() - 5..],
        &[
            "python",
            "setup.py",
            "bdist_egg",
            "--dist-dir",
            "/work/numpy-dist/android-26-armeabi-v7a",
        ]
    );

    let clone = plan
        .iter()
        .find(|stage| stage.name == phases::CLONE_OPENCV)
        .unwrap();
    assert_eq!(clone.environment, ExecutionEnvironment::Local);
    let invocation = dispatcher
        .host_invocation(
            clone.environment,
            &clone.commands[0],
            &clone.working_dir,
            &clone.exports,
        )
        .unwrap();
    assert_eq!(invocation, clone.commands[0]);
    assert_eq!(invocation[0], "git");
}
