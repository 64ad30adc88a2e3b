//! Integration tests for modcache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn modcache(dir: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("modcache");
        cmd.current_dir(dir.path()).env_remove("MODCACHE_CONFIG");
        cmd
    }

    #[test]
    fn help_displays() {
        let dir = TempDir::new().unwrap();
        modcache(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("incremental build cache"));
    }

    #[test]
    fn version_displays() {
        let dir = TempDir::new().unwrap();
        modcache(&dir)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("modcache"));
    }

    #[test]
    fn hash_is_stable() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("package.json"), r#"{"name":"app"}"#).unwrap();

        let first = modcache(&dir).arg("hash").assert().success().get_output().stdout.clone();
        let second = modcache(&dir).arg("hash").assert().success().get_output().stdout.clone();

        assert_eq!(first, second);
        assert_eq!(String::from_utf8(first).unwrap().trim().len(), 64);
    }

    #[test]
    fn hash_missing_dep_fails() {
        let dir = TempDir::new().unwrap();
        modcache(&dir)
            .args(["hash", "--dep", "missing.config.js"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("reading dependency file"));
    }

    #[test]
    fn config_show_reads_local_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("modcache.toml"), "name = \"web-app\"\n").unwrap();

        modcache(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("web-app"));
    }

    #[test]
    fn config_path() {
        let dir = TempDir::new().unwrap();
        modcache(&dir)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("modcache.toml"));
    }

    #[test]
    fn invalid_config_reports_path() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("modcache.toml"), "prebuild = [{ regex = \"(\" }]\n").unwrap();

        modcache(&dir)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn cache_info_without_cache() {
        let dir = TempDir::new().unwrap();
        modcache(&dir)
            .args(["cache", "info"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache for the current version hash"));
    }

    #[test]
    fn cache_clear_requires_confirmation() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("node_modules/.cache/modcache/default");
        std::fs::create_dir_all(&root).unwrap();

        modcache(&dir)
            .args(["cache", "clear"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--yes"));
        assert!(root.exists());

        modcache(&dir).args(["cache", "clear", "--yes"]).assert().success();
        assert!(!root.exists());
    }
}

mod pipeline_tests {
    use async_trait::async_trait;
    use modcache::build::{BuildConfig, OutputOptions};
    use modcache::config::{BuildMode, CacheConfig, CacheSettings};
    use modcache::plugin::{
        InputOptions, LoadHook, Plugin, PluginContext, ResolveHook, ResolveOptions, ResolvedId,
        SourceDescription, StartHook, TracingContext, TransformHook,
    };
    use modcache::prebuild::{BundleOptions, Bundler};
    use modcache::{cache_build, Collaborators, ModcacheResult};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    /// Appends a suffix and logs every call to a file
    struct Suffix {
        log: PathBuf,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TransformHook for Suffix {
        async fn transform_module(
            &self,
            _ctx: &dyn PluginContext,
            code: &str,
            id: &str,
        ) -> ModcacheResult<Option<SourceDescription>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut log = std::fs::read_to_string(&self.log).unwrap_or_default();
            log.push_str(&format!("{id}\n"));
            std::fs::write(&self.log, log).unwrap();
            Ok(Some(SourceDescription::new(format!("{code}\n// suffix"))))
        }
    }

    /// Serves `virtual:<id>` modules and counts start, resolve and load calls
    #[derive(Default)]
    struct HookCounts {
        starts: AtomicUsize,
        resolves: AtomicUsize,
        loads: AtomicUsize,
    }

    impl HookCounts {
        fn snapshot(&self) -> (usize, usize, usize) {
            (
                self.starts.load(Ordering::SeqCst),
                self.resolves.load(Ordering::SeqCst),
                self.loads.load(Ordering::SeqCst),
            )
        }
    }

    #[async_trait]
    impl StartHook for HookCounts {
        async fn start(&self, _ctx: &dyn PluginContext, _options: &InputOptions) -> ModcacheResult<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl ResolveHook for HookCounts {
        async fn resolve_module(
            &self,
            _ctx: &dyn PluginContext,
            id: &str,
            _importer: Option<&str>,
            _options: &ResolveOptions,
        ) -> ModcacheResult<Option<ResolvedId>> {
            self.resolves.fetch_add(1, Ordering::SeqCst);
            Ok(Some(ResolvedId::new(format!("virtual:{id}"))))
        }
    }

    #[async_trait]
    impl LoadHook for HookCounts {
        async fn load_module(
            &self,
            _ctx: &dyn PluginContext,
            id: &str,
        ) -> ModcacheResult<Option<SourceDescription>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Some(SourceDescription::new(format!("export default \"{id}\";"))))
        }
    }

    /// Bundles a fake module graph: externals become imports, everything
    /// else reachable from the entry is inlined.
    #[derive(Default)]
    struct GraphBundler {
        graph: HashMap<String, Vec<String>>,
        builds: Mutex<Vec<String>>,
    }

    impl GraphBundler {
        fn inline(&self, id: &str, options: &BundleOptions, out: &mut String, seen: &mut Vec<String>) {
            if seen.iter().any(|s| s == id) {
                return;
            }
            seen.push(id.to_string());
            for dep in self.graph.get(id).into_iter().flatten() {
                if options.external.contains(dep) {
                    out.push_str(&format!("import \"{}\";\n", options.paths[dep]));
                } else {
                    self.inline(dep, options, out, seen);
                }
            }
            out.push_str(&format!("/* module {id} */\n"));
        }
    }

    #[async_trait]
    impl Bundler for GraphBundler {
        async fn bundle(&self, options: &BundleOptions) -> ModcacheResult<()> {
            self.builds.lock().unwrap().push(options.input.clone());
            let mut out = String::new();
            self.inline(&options.input, options, &mut out, &mut vec![]);
            std::fs::write(&options.output_file, out).unwrap();
            Ok(())
        }
    }

    /// Minimal host pipeline: resolve, load and transform each input module
    /// through the plugin chain, then run every end hook.
    async fn run_build(config: &BuildConfig, sources: &HashMap<&str, &str>) -> ModcacheResult<Vec<String>> {
        let ctx = TracingContext;
        for plugin in &config.plugins {
            if let Some(hook) = &plugin.start {
                hook.start(&ctx, &InputOptions { input: config.input.clone() }).await?;
            }
        }

        let mut outputs = vec![];
        for input in &config.input {
            let mut id = input.clone();
            for plugin in &config.plugins {
                if let Some(hook) = &plugin.resolve_module {
                    if let Some(resolved) = hook
                        .resolve_module(&ctx, input, None, &ResolveOptions { is_entry: true })
                        .await?
                    {
                        id = resolved.id;
                        break;
                    }
                }
            }

            let mut code = None;
            for plugin in &config.plugins {
                if let Some(hook) = &plugin.load_module {
                    if let Some(loaded) = hook.load_module(&ctx, &id).await? {
                        code = Some(loaded.code);
                        break;
                    }
                }
            }
            let mut code = code.unwrap_or_else(|| sources[id.as_str()].to_string());

            for plugin in &config.plugins {
                if let Some(hook) = &plugin.transform_module {
                    if let Some(transformed) = hook.transform_module(&ctx, &code, &id).await? {
                        code = transformed.code;
                    }
                }
            }

            let imports: Vec<String> = code
                .lines()
                .filter_map(|line| line.strip_prefix("import "))
                .map(|import| import.trim_matches(['"', ';']).to_string())
                .collect();
            for import in imports {
                if config.external.is_external(&import, Some(id.as_str()), false) {
                    let path = config.output[0].import_path(&import);
                    code = code.replace(&format!("\"{import}\""), &format!("\"{path}\""));
                }
            }
            outputs.push(code);
        }

        for plugin in &config.plugins {
            if let Some(hook) = &plugin.end {
                hook.end(&ctx, None).await?;
            }
        }
        Ok(outputs)
    }

    fn settings(project: &Path, config: CacheConfig) -> CacheSettings {
        config.resolve(BuildMode::Development, project).unwrap()
    }

    fn install(project: &Path, name: &str) -> PathBuf {
        let dir = project.join("node_modules").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("package.json"), format!(r#"{{"name":"{name}"}}"#)).unwrap();
        std::fs::write(dir.join("index.js"), "").unwrap();
        dir.join("package.json")
    }

    #[tokio::test]
    async fn repeated_build_reuses_transform() {
        let project = TempDir::new().unwrap();
        let log = project.path().join("transform.log");
        let calls = Arc::new(AtomicUsize::new(0));
        let settings = settings(
            project.path(),
            CacheConfig {
                cache_dir: PathBuf::from("t"),
                cacheable_plugins: vec!["suffix".to_string()],
                ..CacheConfig::default()
            },
        );
        let sources = HashMap::from([("main.js", "export const x = 1;")]);

        let mut results = vec![];
        for _ in 0..2 {
            let build = BuildConfig {
                input: vec!["main.js".to_string()],
                plugins: vec![Plugin::new("suffix").with_transform(Suffix {
                    log: log.clone(),
                    calls: calls.clone(),
                })],
                ..BuildConfig::default()
            };
            let collaborators = Collaborators::new(Arc::new(GraphBundler::default()), &settings);
            let wrapped = cache_build(&settings, build, collaborators).await.unwrap();
            results.push(run_build(&wrapped, &sources).await.unwrap());
        }

        assert_eq!(results[0], results[1]);
        assert_eq!(results[0][0], "export const x = 1;\n// suffix");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "main.js\n");
        assert!(project.path().join("t").join("default").is_dir());
    }

    #[tokio::test]
    async fn watched_manifest_change_moves_namespace() {
        let project = TempDir::new().unwrap();
        std::fs::write(project.path().join("package.json"), r#"{"version":"1.0.0"}"#).unwrap();
        let settings = settings(
            project.path(),
            CacheConfig {
                cacheable_plugins: vec!["virtual".to_string()],
                ..CacheConfig::default()
            },
        );
        let counts = Arc::new(HookCounts::default());
        let sources = HashMap::new();

        let mut counts_per_build = vec![];
        for round in 0..3 {
            if round == 2 {
                std::fs::write(project.path().join("package.json"), r#"{"version":"1.1.0"}"#).unwrap();
            }
            let build = BuildConfig {
                input: vec!["entry".to_string()],
                plugins: vec![Plugin {
                    start: Some(counts.clone()),
                    resolve_module: Some(counts.clone()),
                    load_module: Some(counts.clone()),
                    ..Plugin::new("virtual")
                }],
                ..BuildConfig::default()
            };
            let collaborators = Collaborators::new(Arc::new(GraphBundler::default()), &settings);
            let wrapped = cache_build(&settings, build, collaborators).await.unwrap();
            let output = run_build(&wrapped, &sources).await.unwrap();
            assert_eq!(output, vec!["export default \"virtual:entry\";".to_string()]);

            counts_per_build.push(counts.snapshot());
        }

        // start always runs; resolve and load hit on the second build only
        assert_eq!(counts_per_build, vec![(1, 1, 1), (2, 1, 1), (3, 2, 2)]);
        let hashes = std::fs::read_dir(&settings.cache_root).unwrap().count();
        assert_eq!(hashes, 2);
    }

    #[tokio::test]
    async fn changed_source_invalidates_transform() {
        let project = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let settings = settings(
            project.path(),
            CacheConfig {
                cacheable_plugins: vec!["suffix".to_string()],
                ..CacheConfig::default()
            },
        );

        for source in ["let a = 1;", "let a = 2;"] {
            let build = BuildConfig {
                input: vec!["main.js".to_string()],
                plugins: vec![Plugin::new("suffix").with_transform(Suffix {
                    log: project.path().join("log"),
                    calls: calls.clone(),
                })],
                ..BuildConfig::default()
            };
            let collaborators = Collaborators::new(Arc::new(GraphBundler::default()), &settings);
            let wrapped = cache_build(&settings, build, collaborators).await.unwrap();
            run_build(&wrapped, &HashMap::from([("main.js", source)])).await.unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn disabled_caching_returns_config_untouched() {
        let project = TempDir::new().unwrap();
        let settings = CacheConfig::default()
            .resolve(BuildMode::Production, project.path())
            .unwrap();
        let build = BuildConfig {
            plugins: vec![Plugin::new("babel")],
            ..BuildConfig::default()
        };

        let collaborators = Collaborators::new(Arc::new(GraphBundler::default()), &settings);
        let wrapped = cache_build(&settings, build, collaborators).await.unwrap();

        assert_eq!(wrapped.plugins[0].name, "babel");
    }

    #[tokio::test]
    async fn prebuild_without_output_target_fails_early() {
        let project = TempDir::new().unwrap();
        let settings = settings(
            project.path(),
            CacheConfig {
                prebuild: vec![modcache::build::Pattern::exact("react")],
                ..CacheConfig::default()
            },
        );

        let collaborators = Collaborators::new(Arc::new(GraphBundler::default()), &settings);
        let err = cache_build(&settings, BuildConfig::default(), collaborators)
            .await
            .unwrap_err();

        assert!(err.is_config_error());
        assert!(!settings.cache_root.exists());
    }

    #[tokio::test]
    async fn shared_dependency_is_linked_not_duplicated() {
        let project = TempDir::new().unwrap();
        for name in ["a", "b", "c"] {
            install(project.path(), name);
        }
        let settings = settings(
            project.path(),
            CacheConfig {
                prebuild: vec![modcache::build::Pattern::regex("^[abc]$").unwrap()],
                ..CacheConfig::default()
            },
        );
        let bundler = Arc::new(GraphBundler {
            graph: HashMap::from([
                ("a".to_string(), vec!["c".to_string()]),
                ("b".to_string(), vec!["c".to_string()]),
                ("c".to_string(), vec![]),
            ]),
            ..GraphBundler::default()
        });
        let build = BuildConfig {
            input: vec!["main.js".to_string()],
            output: vec![OutputOptions {
                dir: Some(project.path().join("dist")),
                ..OutputOptions::default()
            }],
            ..BuildConfig::default()
        };
        let collaborators = Collaborators::new(bundler.clone(), &settings);
        let wrapped = cache_build(&settings, build, collaborators).await.unwrap();

        let sources = HashMap::from([("main.js", "import \"a\";\nimport \"b\";\nimport \"c\";")]);
        let output = run_build(&wrapped, &sources).await.unwrap();

        assert!(output[0].contains("import \"./npm/a.bundle.js\";"));
        let npm = project.path().join("dist").join("npm");
        let a = std::fs::read_to_string(npm.join("a.bundle.js")).unwrap();
        let b = std::fs::read_to_string(npm.join("b.bundle.js")).unwrap();
        let c = std::fs::read_to_string(npm.join("c.bundle.js")).unwrap();

        assert!(a.contains("import \"./c.bundle.js\";"));
        assert!(!a.contains("module c"));
        assert!(b.contains("import \"./c.bundle.js\";"));
        assert!(!b.contains("module c"));
        assert!(c.contains("/* module c */"));
    }

    #[tokio::test]
    async fn only_stale_bundles_are_rebuilt() {
        let project = TempDir::new().unwrap();
        let manifest = install(project.path(), "d");
        install(project.path(), "e");
        let settings = settings(
            project.path(),
            CacheConfig {
                prebuild: vec![
                    modcache::build::Pattern::exact("d"),
                    modcache::build::Pattern::exact("e"),
                ],
                ..CacheConfig::default()
            },
        );
        let sources = HashMap::from([("main.js", "import \"d\";\nimport \"e\";")]);
        let bundler = Arc::new(GraphBundler::default());

        let build = || BuildConfig {
            input: vec!["main.js".to_string()],
            output: vec![OutputOptions {
                file: Some(project.path().join("dist").join("app.js")),
                ..OutputOptions::default()
            }],
            ..BuildConfig::default()
        };

        let first = cache_build(&settings, build(), Collaborators::new(bundler.clone(), &settings))
            .await
            .unwrap();
        run_build(&first, &sources).await.unwrap();
        assert_eq!(bundler.builds.lock().unwrap().len(), 2);

        let e_bundle = project.path().join("dist/npm/e.bundle.js");
        let e_built_at = std::fs::metadata(&e_bundle).unwrap().modified().unwrap();

        // Nothing changed: nothing rebuilt
        let second = cache_build(&settings, build(), Collaborators::new(bundler.clone(), &settings))
            .await
            .unwrap();
        run_build(&second, &sources).await.unwrap();
        assert_eq!(bundler.builds.lock().unwrap().len(), 2);

        // d's package.json moves ahead of its bundle
        std::fs::File::options()
            .write(true)
            .open(&manifest)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
        let third = cache_build(&settings, build(), Collaborators::new(bundler.clone(), &settings))
            .await
            .unwrap();
        run_build(&third, &sources).await.unwrap();

        let builds = bundler.builds.lock().unwrap().clone();
        assert_eq!(builds.len(), 3);
        assert_eq!(builds[2], "d");
        assert_eq!(
            std::fs::metadata(&e_bundle).unwrap().modified().unwrap(),
            e_built_at
        );
    }
}
