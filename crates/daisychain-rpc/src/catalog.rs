//! Demonstration object graph served by `daisychain-rpc serve`.
//!
//! ```text
//! Root ── GetProjectManager ──> ProjectManager ── CreateProject / LoadProject ──> Project
//! ```

use daisychain_core::{DaisyError, Exposed, MethodTable, ObjectHandle, Result, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};
use uuid::Uuid;

const PRODUCT_NAME: &str = "DaisyChain Demo Host";
const VERSION: [i64; 3] = [0, 3, 0];

/// Build the anchor object.
pub fn root() -> ObjectHandle {
    Arc::new(Root {
        manager: Arc::new(ProjectManager::default()),
    })
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| DaisyError::Other("demo state lock poisoned".to_string()))
}

pub struct Root {
    manager: Arc<ProjectManager>,
}

static ROOT_METHODS: LazyLock<MethodTable<Root>> = LazyLock::new(|| {
    MethodTable::<Root>::new("Root")
        .method("GetProductName", |_, _| Ok(Value::from(PRODUCT_NAME)))
        .method("GetVersion", |_, _| {
            Ok(Value::List(VERSION.iter().map(|&n| Value::from(n)).collect()))
        })
        .method("GetVersionString", |_, _| {
            Ok(Value::from(format!("{}.{}.{}", VERSION[0], VERSION[1], VERSION[2])))
        })
        .method("GetProjectManager", |root, _| {
            let manager: ObjectHandle = root.manager.clone();
            Ok(Value::Object(manager))
        })
        .method("Echo", |_, args| {
            args.expect_at_most(1)?;
            Ok(args.get(0, "value").cloned().unwrap_or_default())
        })
});

impl Exposed for Root {
    fn repr(&self) -> Result<String> {
        Ok(format!("Root [{}]", PRODUCT_NAME))
    }

    fn methods() -> &'static MethodTable<Self> {
        &ROOT_METHODS
    }
}

#[derive(Default)]
pub struct ProjectManager {
    projects: Mutex<Vec<Arc<Project>>>,
    current: Mutex<Option<Arc<Project>>>,
}

impl ProjectManager {
    fn find(&self, name: &str) -> Result<Option<Arc<Project>>> {
        for project in lock(&self.projects)?.iter() {
            if project.name()? == name {
                return Ok(Some(project.clone()));
            }
        }
        Ok(None)
    }

    fn create(&self, name: &str) -> Result<Option<Arc<Project>>> {
        if self.find(name)?.is_some() {
            return Ok(None);
        }
        let project = Arc::new(Project::new(name));
        lock(&self.projects)?.push(project.clone());
        *lock(&self.current)? = Some(project.clone());
        Ok(Some(project))
    }

    fn load(&self, name: &str) -> Result<Option<Arc<Project>>> {
        let project = self.find(name)?;
        if project.is_some() {
            *lock(&self.current)? = project.clone();
        }
        Ok(project)
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let is_current = match lock(&self.current)?.as_ref() {
            Some(current) => current.name()? == name,
            None => false,
        };
        if is_current {
            return Ok(false);
        }
        let mut projects = lock(&self.projects)?;
        let before = projects.len();
        let mut kept = Vec::with_capacity(before);
        for project in projects.drain(..) {
            if project.name()? != name {
                kept.push(project);
            }
        }
        *projects = kept;
        Ok(projects.len() < before)
    }

    fn names(&self) -> Result<Vec<String>> {
        lock(&self.projects)?.iter().map(|p| p.name()).collect()
    }
}

fn project_value(project: Option<Arc<Project>>) -> Value {
    match project {
        Some(project) => {
            let handle: ObjectHandle = project;
            Value::Object(handle)
        }
        None => Value::Null,
    }
}

static MANAGER_METHODS: LazyLock<MethodTable<ProjectManager>> = LazyLock::new(|| {
    MethodTable::<ProjectManager>::new("ProjectManager")
        .method("CreateProject", |pm, args| {
            let name = args.require_str(0, "projectName")?;
            Ok(project_value(pm.create(name)?))
        })
        .method("LoadProject", |pm, args| {
            let name = args.require_str(0, "projectName")?;
            Ok(project_value(pm.load(name)?))
        })
        .method("DeleteProject", |pm, args| {
            let name = args.require_str(0, "projectName")?;
            Ok(Value::from(pm.delete(name)?))
        })
        .method("GetCurrentProject", |pm, _| {
            Ok(project_value(lock(&pm.current)?.clone()))
        })
        .method("CloseProject", |pm, args| {
            let project = args.require_object_of::<Project>(0, "project")?;
            let mut current = lock(&pm.current)?;
            let is_current = current
                .as_ref()
                .is_some_and(|c| std::ptr::eq(Arc::as_ptr(c), project));
            if is_current {
                *current = None;
            }
            Ok(Value::from(is_current))
        })
        .method("GetProjectListInCurrentFolder", |pm, _| {
            Ok(Value::from(pm.names()?))
        })
});

impl Exposed for ProjectManager {
    fn repr(&self) -> Result<String> {
        Ok("ProjectManager".to_string())
    }

    fn methods() -> &'static MethodTable<Self> {
        &MANAGER_METHODS
    }
}

pub struct Project {
    unique_id: Uuid,
    name: Mutex<String>,
    settings: Mutex<BTreeMap<String, String>>,
}

impl Project {
    fn new(name: &str) -> Self {
        let mut settings = BTreeMap::new();
        settings.insert("timelineFrameRate".to_string(), "24".to_string());
        settings.insert("timelineResolutionWidth".to_string(), "1920".to_string());
        settings.insert("timelineResolutionHeight".to_string(), "1080".to_string());
        Self {
            unique_id: Uuid::new_v4(),
            name: Mutex::new(name.to_string()),
            settings: Mutex::new(settings),
        }
    }

    fn name(&self) -> Result<String> {
        Ok(lock(&self.name)?.clone())
    }
}

static PROJECT_METHODS: LazyLock<MethodTable<Project>> = LazyLock::new(|| {
    MethodTable::<Project>::new("Project")
        .method("GetName", |project, _| Ok(Value::from(project.name()?)))
        .method("SetName", |project, args| {
            let name = args.require_str(0, "projectName")?;
            if name.is_empty() {
                return Ok(Value::from(false));
            }
            *lock(&project.name)? = name.to_string();
            Ok(Value::from(true))
        })
        .method("GetUniqueId", |project, _| {
            Ok(Value::from(project.unique_id.to_string()))
        })
        .method("GetSetting", |project, args| {
            let settings = lock(&project.settings)?;
            match args.get_str(0, "settingName") {
                Some(key) => Ok(settings.get(key).cloned().map(Value::from).unwrap_or_default()),
                None => Ok(Value::from(settings.clone())),
            }
        })
        .method("SetSetting", |project, args| {
            let key = args.require_str(0, "settingName")?;
            let value = args.require_str(1, "settingValue")?;
            lock(&project.settings)?.insert(key.to_string(), value.to_string());
            Ok(Value::from(true))
        })
});

impl Exposed for Project {
    fn repr(&self) -> Result<String> {
        Ok(format!("Project ({})", self.unique_id))
    }

    fn methods() -> &'static MethodTable<Self> {
        &PROJECT_METHODS
    }
}
