use std::fs::File;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::RaccoonError;
use crate::host::Host;
use crate::infra::{Infrastructure, InfrastructureSpec};
use crate::recipe::{build_recipes, BookSpec, Recipe};

/// One unit of dispatch: a recipe to run on every host of a cluster.
#[derive(Debug, Clone)]
pub struct Job {
    pub cluster: String,
    /// Title of the recipe this job runs.
    pub group: String,
    pub hosts: Vec<Host>,
    /// Shared read-only by every host worker of this job.
    pub recipe: Arc<Recipe>,
}

impl Job {
    pub fn new(cluster: impl Into<String>, hosts: Vec<Host>, recipe: Recipe) -> Self {
        Self {
            cluster: cluster.into(),
            group: recipe.title.clone(),
            hosts,
            recipe: Arc::new(recipe),
        }
    }

    /// Number of instruction executions this job amounts to.
    pub fn units(&self) -> usize {
        self.hosts.len() * self.recipe.len()
    }
}

/// Pair every cluster with each of its tasks, in the order the tasks are listed.
pub fn build_jobs(
    infrastructure: &Infrastructure,
    recipes: &[Recipe],
) -> Result<Vec<Job>, RaccoonError> {
    let mut jobs = vec![];
    let mut errors = vec![];
    for cluster in &infrastructure.clusters {
        for task in &cluster.tasks {
            match recipes.iter().find(|recipe| &recipe.title == task) {
                Some(recipe) => jobs.push(Job::new(
                    cluster.name.clone(),
                    cluster.hosts.clone(),
                    recipe.clone(),
                )),
                None => errors.push(format!(
                    "Task '{}' of cluster '{}' has no matching recipe",
                    task, cluster.name
                )),
            }
        }
    }
    if !errors.is_empty() {
        return Err(RaccoonError::Invalid(errors));
    }
    Ok(jobs)
}

/// Infrastructure and recipes delivered together in one document:
/// `{infrastructure: {...}, tasks: [book, ...]}`.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub infrastructure: Infrastructure,
    pub recipes: Vec<Recipe>,
}

#[derive(Debug, Default, Deserialize)]
struct RequestSpec {
    #[serde(default)]
    infrastructure: InfrastructureSpec,
    #[serde(default, alias = "books")]
    tasks: Vec<BookSpec>,
}

impl JobRequest {
    pub fn parse(contents: &str) -> Result<Self, RaccoonError> {
        let spec: RequestSpec = serde_yaml::from_str(contents).map_err(|e| RaccoonError::Parse {
            path: "<job>".to_string(),
            source: Box::new(e),
        })?;
        Self::resolve(spec)
    }

    pub fn load(path: &str) -> Result<Self, RaccoonError> {
        let file = File::open(path).map_err(|e| RaccoonError::Parse {
            path: path.to_string(),
            source: Box::new(e),
        })?;
        let spec: RequestSpec = serde_yaml::from_reader(file).map_err(|e| RaccoonError::Parse {
            path: path.to_string(),
            source: Box::new(e),
        })?;
        Self::resolve(spec)
    }

    pub fn jobs(&self) -> Result<Vec<Job>, RaccoonError> {
        build_jobs(&self.infrastructure, &self.recipes)
    }

    /// Validate both halves, reporting the problems of each together.
    fn resolve(spec: RequestSpec) -> Result<Self, RaccoonError> {
        match (
            Infrastructure::resolve(spec.infrastructure),
            build_recipes(spec.tasks),
        ) {
            (Ok(infrastructure), Ok(recipes)) => Ok(Self {
                infrastructure,
                recipes,
            }),
            (Err(RaccoonError::Invalid(mut errors)), Err(RaccoonError::Invalid(more))) => {
                errors.extend(more);
                Err(RaccoonError::Invalid(errors))
            }
            (Err(e), _) | (_, Err(e)) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::parse_recipes;

    const INFRA: &str = r#"
name: prod
infrastructure:
  - name: web
    tasks: [setup, deploy]
    username: root
    hosts: [10.0.0.1, 10.0.0.2]
  - name: db
    tasks: [setup]
    username: root
    hosts: [10.0.1.1]
"#;

    const RECIPES: &str = r#"
- title: setup
  instructions:
    - {name: RUN, description: update, instruction: apt-get update}
- title: deploy
  instructions:
    - {name: ADD, description: ship, sourcePath: app.tar, destPath: /srv}
    - {name: RUN, description: unpack, instruction: tar xf /srv/app.tar}
"#;

    #[test]
    fn test_one_job_per_cluster_task() {
        let infra = Infrastructure::parse(INFRA).unwrap();
        let recipes = parse_recipes(RECIPES).unwrap();
        let jobs = build_jobs(&infra, &recipes).unwrap();
        let names: Vec<_> = jobs
            .iter()
            .map(|job| (job.cluster.as_str(), job.group.as_str()))
            .collect();
        assert_eq!(names, vec![("web", "setup"), ("web", "deploy"), ("db", "setup")]);
        assert_eq!(jobs[1].units(), 4);
        assert_eq!(jobs[2].units(), 1);
    }

    #[test]
    fn test_missing_recipe() {
        let infra = Infrastructure::parse(INFRA).unwrap();
        let recipes = parse_recipes("- title: setup\n").unwrap();
        match build_jobs(&infra, &recipes) {
            Err(RaccoonError::Invalid(errors)) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].contains("'deploy'"));
            }
            other => panic!("unexpected result: {:?}", other.map(|jobs| jobs.len())),
        }
    }

    const REQUEST: &str = r#"{"infrastructure": {"name": "A name","infrastructure": [ {"name": "some cluster","tasks": ["task2"],"hosts": [{ "ip": "172.17.42.1", "sshPort": 32768, "username": "root", "description": "cassandra01", "password": "root"},{ "ip": "172.17.42.1", "sshPort": 32769, "description": "cassandra02", "username": "root", "interactiveAuth": true},{ "ip": "172.17.42.1", "sshPort": 32768, "description": "cassandra03", "username": "root", "password": "root"}] }]},"tasks": [{ "title": "task1", "maintainer": "Burkraith", "commands": [{"name": "ADD","sourcePath": "doc.go","destPath": "/tmp","description": "doc.go to /tmp"},{"name": "RUN","description": "Removing htop","instruction": "sudo yum remove -y htop"}]},{ "title": "task2", "maintainer": "Mario", "commands": [{"name": "RUN","description": "Removing htop","instruction": "sudo apt-get remove -y htop"} ]}] }"#;

    #[test]
    fn test_parse_request() {
        let request = JobRequest::parse(REQUEST).unwrap();
        assert_eq!(request.infrastructure.name, "A name");
        assert_eq!(request.recipes.len(), 2);
        let jobs = request.jobs().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].group, "task2");
        assert_eq!(jobs[0].recipe.maintainer, "Mario");
        assert_eq!(jobs[0].units(), 3);
    }

    #[test]
    fn test_malformed_request() {
        assert!(JobRequest::parse("{wrong:\"syntax\",}").is_err());
        assert!(matches!(
            JobRequest::parse(r#"{"infrastructure": {"name": "#),
            Err(RaccoonError::Parse { .. })
        ));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let request =
            JobRequest::parse(&REQUEST.replacen('{', r#"{"requestedBy": "ops","#, 1)).unwrap();
        assert_eq!(request.jobs().unwrap().len(), 1);

        // A misspelled section is skipped like any unknown key, which leaves no clusters.
        match JobRequest::parse(&REQUEST.replacen(r#""infrastructure": ["#, r#""infras2tructure": ["#, 1)) {
            Err(RaccoonError::Invalid(errors)) => {
                assert_eq!(errors, vec!["No cluster were found on infrastructure file"]);
            }
            other => panic!("unexpected result: {:?}", other.map(|r| r.recipes.len())),
        }
    }

    #[test]
    fn test_request_reports_both_halves() {
        let err = JobRequest::parse(
            r#"
infrastructure:
  infrastructure:
    - name: web
      tasks: [setup]
      hosts: [{ip: 10.0.0.1, username: root}]
tasks:
  - title: setup
    commands:
      - {name: COPY}
"#,
        )
        .unwrap_err();
        match err {
            RaccoonError::Invalid(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].contains("name can't be blank"));
                assert!(errors[1].contains("unknown name 'COPY'"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
