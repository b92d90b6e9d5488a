//! Built-in Modules
//!
//! The modules compiled into the server, in link order. Core modules come
//! first; each protocol block is a core module followed by its category's
//! modules.

use module_runtime::{CoreContext, ModuleDescriptor, ScopedContext};
use module_types::{ConfigBlock, HookError};

// ─────────────────────────────────────────────────────────────────────────────
// Config Blocks
// ─────────────────────────────────────────────────────────────────────────────

/// Config of the `core` module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConf {
    pub worker_processes: usize,
    pub daemon: bool,
}

/// Config of the `events` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventsConf {
    pub worker_connections: usize,
}

/// Main config of `event_core`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCoreConf {
    pub connections: usize,
    pub multi_accept: bool,
}

/// Main config of `epoll`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpollConf {
    pub events: usize,
}

/// Main config of `http_core`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCoreConf {
    pub server_names_hash_max_size: usize,
    pub variables_hash_max_size: usize,
}

/// Main config of `http_log`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpLogConf {
    pub formats: Vec<String>,
}

/// Main config of `stream_core`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCoreConf {
    pub variables_hash_max_size: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Module Set
// ─────────────────────────────────────────────────────────────────────────────

/// Descriptors of every built-in module, in link order
pub fn builtin_modules() -> Vec<ModuleDescriptor> {
    vec![
        ModuleDescriptor::core(
            "core",
            CoreContext::new()
                .with_create_conf(|_| {
                    let workers = std::thread::available_parallelism().map_or(1, |n| n.get());
                    Ok(ConfigBlock::new(CoreConf {
                        worker_processes: workers,
                        daemon: true,
                    }))
                })
                .with_init_conf(|_, block| match block.downcast_ref::<CoreConf>() {
                    Some(conf) if conf.worker_processes == 0 => Err(HookError::new("worker_processes must be positive")),
                    Some(_) => Ok(()),
                    None => Err(HookError::new("core config has the wrong type")),
                }),
        ),
        ModuleDescriptor::core("errlog", CoreContext::new()),
        ModuleDescriptor::core(
            "events",
            CoreContext::new().with_create_conf(|_| {
                Ok(ConfigBlock::new(EventsConf {
                    worker_connections: 512,
                }))
            }),
        ),
        ModuleDescriptor::conf("conf"),
        ModuleDescriptor::event(
            "event_core",
            ScopedContext::new()
                .with_create_main_conf(|cycle| {
                    let events = cycle.module_conf::<EventsConf>("events")?;
                    Ok(ConfigBlock::new(EventCoreConf {
                        connections: events.worker_connections,
                        multi_accept: false,
                    }))
                })
                .with_init_main_conf(|_, block| match block.downcast_ref::<EventCoreConf>() {
                    Some(conf) if conf.connections == 0 => Err(HookError::new("no connections configured")),
                    _ => Ok(()),
                }),
        ),
        ModuleDescriptor::event(
            "epoll",
            ScopedContext::new().with_create_main_conf(|_| Ok(ConfigBlock::new(EpollConf { events: 512 }))),
        ),
        ModuleDescriptor::core("http", CoreContext::new()),
        ModuleDescriptor::http(
            "http_core",
            ScopedContext::new().with_create_main_conf(|_| {
                Ok(ConfigBlock::new(HttpCoreConf {
                    server_names_hash_max_size: 512,
                    variables_hash_max_size: 1024,
                }))
            }),
        ),
        ModuleDescriptor::http(
            "http_log",
            ScopedContext::new().with_create_main_conf(|_| {
                Ok(ConfigBlock::new(HttpLogConf {
                    formats: vec!["combined".to_string()],
                }))
            }),
        ),
        ModuleDescriptor::http("http_static", ScopedContext::new()),
        ModuleDescriptor::http("http_gzip", ScopedContext::new()),
        ModuleDescriptor::http("http_headers_filter", ScopedContext::new()),
        ModuleDescriptor::http("http_copy_filter", ScopedContext::new()),
        ModuleDescriptor::core("stream", CoreContext::new()),
        ModuleDescriptor::stream(
            "stream_core",
            ScopedContext::new().with_create_main_conf(|_| {
                Ok(ConfigBlock::new(StreamCoreConf {
                    variables_hash_max_size: 1024,
                }))
            }),
        ),
        ModuleDescriptor::core("mail", CoreContext::new()),
        ModuleDescriptor::mail("mail_core", ScopedContext::new()),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use module_runtime::{BuiltinModules, build_generation};
    use module_types::ModuleCategory;

    use super::*;

    #[test]
    fn test_names_are_unique() {
        let modules = builtin_modules();
        let names: HashSet<_> = modules.iter().map(|m| m.name().to_string()).collect();
        assert_eq!(names.len(), modules.len());
    }

    #[test]
    fn test_generation_from_builtins() {
        let builtins = BuiltinModules::bootstrap(builtin_modules()).unwrap();
        let cycle = build_generation(&builtins, None, Vec::new()).unwrap();

        assert!(cycle.module_conf::<CoreConf>("core").unwrap().worker_processes >= 1);
        assert_eq!(
            cycle.module_conf::<EventCoreConf>("event_core").unwrap().connections,
            512
        );
        assert_eq!(cycle.module_conf::<EpollConf>("epoll").unwrap().events, 512);
        assert_eq!(
            cycle.module_conf::<HttpLogConf>("http_log").unwrap().formats,
            vec!["combined".to_string()]
        );
        assert_eq!(cycle.slot_count(ModuleCategory::Http), Some(6));
        assert_eq!(cycle.slot_count(ModuleCategory::Mail), Some(1));
    }
}
