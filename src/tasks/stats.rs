//! Statistics calculators selected with `--script`.
//!
//! Calculators are tasks: they accumulate per version and print their report
//! from the `end` hook.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::data::{read_result_table, Classification, Project, ProjectVersion, RESULT_FILE};
use crate::error::TaskError;
use crate::pipeline::{BenchmarkConfig, ConfigError, Task, TaskContext, TaskResult};

type CalculatorFactory = fn(&BenchmarkConfig) -> Box<dyn Task>;

/// Registered calculators, by name.
const CALCULATORS: &[(&str, CalculatorFactory)] = &[
    ("projects", projects),
    ("summary", summary),
    ("violations", violations),
];

fn projects(_config: &BenchmarkConfig) -> Box<dyn Task> {
    Box::new(ProjectsCalculator::default())
}

fn summary(config: &BenchmarkConfig) -> Box<dyn Task> {
    Box::new(SummaryCalculator::new(config))
}

fn violations(_config: &BenchmarkConfig) -> Box<dyn Task> {
    Box::new(ViolationsCalculator::default())
}

/// Names of the available calculators.
pub fn calculator_names() -> Vec<&'static str> {
    CALCULATORS.iter().map(|(name, _)| *name).collect()
}

/// Creates calculator `name`.
pub fn create_calculator(name: &str, config: &BenchmarkConfig) -> Result<Box<dyn Task>, ConfigError> {
    CALCULATORS
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, factory)| factory(config))
        .ok_or_else(|| ConfigError::InvalidValue {
            key: "script".to_string(),
            message: format!(
                "unknown calculator '{}' (available: {})",
                name,
                calculator_names().join(", ")
            ),
        })
}

/// Detection quality per detector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl Tally {
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// TP/FP/FN, precision and recall per detector from the result tables.
pub struct SummaryCalculator {
    results_path: PathBuf,
    detector: Option<String>,
    tallies: BTreeMap<String, Tally>,
}

impl SummaryCalculator {
    pub fn new(config: &BenchmarkConfig) -> Self {
        Self {
            results_path: config.results_path.clone(),
            detector: config.detector.clone(),
            tallies: BTreeMap::new(),
        }
    }

    fn detectors(&self) -> Result<Vec<String>, TaskError> {
        if let Some(ref name) = self.detector {
            return Ok(vec![name.clone()]);
        }
        if !self.results_path.is_dir() {
            return Ok(Vec::new());
        }
        let mut names: Vec<String> = fs::read_dir(&self.results_path)?
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn tallies(&self) -> &BTreeMap<String, Tally> {
        &self.tallies
    }

    pub fn report(&self) -> String {
        let mut out = format!(
            "{:<20} {:>6} {:>6} {:>6} {:>9} {:>7}\n",
            "detector", "TP", "FP", "FN", "precision", "recall"
        );
        for (detector, tally) in &self.tallies {
            out.push_str(&format!(
                "{:<20} {:>6} {:>6} {:>6} {:>8.1}% {:>6.1}%\n",
                detector,
                tally.true_positives,
                tally.false_positives,
                tally.false_negatives,
                tally.precision() * 100.0,
                tally.recall() * 100.0
            ));
        }
        out
    }
}

#[async_trait]
impl Task for SummaryCalculator {
    fn name(&self) -> &str {
        "summary"
    }

    async fn run(
        &mut self,
        _project: &Project,
        version: &Arc<ProjectVersion>,
        _ctx: &TaskContext,
    ) -> Result<TaskResult, TaskError> {
        for detector in self.detectors()? {
            let table = self
                .results_path
                .join(&detector)
                .join(&version.project_id)
                .join(&version.version_id)
                .join(RESULT_FILE);
            if !table.is_file() {
                continue;
            }
            let tally = self.tallies.entry(detector).or_default();
            for row in read_result_table(&table)? {
                match row.classification {
                    Classification::TruePositive => tally.true_positives += 1,
                    Classification::FalsePositive => tally.false_positives += 1,
                    Classification::FalseNegative => tally.false_negatives += 1,
                }
            }
        }
        Ok(TaskResult::Completed)
    }

    async fn end(&mut self, _ctx: &TaskContext) -> Result<(), TaskError> {
        print!("{}", self.report());
        Ok(())
    }
}

/// Number of misuses per violation type.
#[derive(Debug, Default)]
pub struct ViolationsCalculator {
    counts: BTreeMap<String, usize>,
}

impl ViolationsCalculator {
    pub fn counts(&self) -> &BTreeMap<String, usize> {
        &self.counts
    }

    pub fn report(&self) -> String {
        let mut out = format!("{:<40} {:>8}\n", "violation", "misuses");
        for (violation, count) in &self.counts {
            out.push_str(&format!("{:<40} {:>8}\n", violation, count));
        }
        out
    }
}

#[async_trait]
impl Task for ViolationsCalculator {
    fn name(&self) -> &str {
        "violations"
    }

    async fn run(
        &mut self,
        _project: &Project,
        version: &Arc<ProjectVersion>,
        _ctx: &TaskContext,
    ) -> Result<TaskResult, TaskError> {
        for misuse in version.misuses() {
            for violation in &misuse.violations {
                *self.counts.entry(violation.clone()).or_default() += 1;
            }
        }
        Ok(TaskResult::Completed)
    }

    async fn end(&mut self, _ctx: &TaskContext) -> Result<(), TaskError> {
        print!("{}", self.report());
        Ok(())
    }
}

/// Versions, misuses and crashes per project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectCounts {
    pub versions: usize,
    pub misuses: usize,
    pub crashes: usize,
}

/// Corpus overview per project.
#[derive(Debug, Default)]
pub struct ProjectsCalculator {
    counts: BTreeMap<String, ProjectCounts>,
}

impl ProjectsCalculator {
    pub fn counts(&self) -> &BTreeMap<String, ProjectCounts> {
        &self.counts
    }

    pub fn report(&self) -> String {
        let mut out = format!(
            "{:<30} {:>8} {:>8} {:>8}\n",
            "project", "versions", "misuses", "crashes"
        );
        for (project, counts) in &self.counts {
            out.push_str(&format!(
                "{:<30} {:>8} {:>8} {:>8}\n",
                project, counts.versions, counts.misuses, counts.crashes
            ));
        }
        out
    }
}

#[async_trait]
impl Task for ProjectsCalculator {
    fn name(&self) -> &str {
        "projects"
    }

    async fn run(
        &mut self,
        project: &Project,
        version: &Arc<ProjectVersion>,
        _ctx: &TaskContext,
    ) -> Result<TaskResult, TaskError> {
        let counts = self.counts.entry(project.id.clone()).or_default();
        counts.versions += 1;
        counts.misuses += version.misuses().len();
        counts.crashes += version.misuses().iter().filter(|m| m.is_crash).count();
        Ok(TaskResult::Completed)
    }

    async fn end(&mut self, _ctx: &TaskContext) -> Result<(), TaskError> {
        print!("{}", self.report());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::synthetic_corpus;
    use crate::utils::write_atomic;
    use tempfile::TempDir;

    fn version(temp: &TempDir) -> (Project, Arc<ProjectVersion>) {
        synthetic_corpus(temp.path());
        let project = Project::load(temp.path(), "p").unwrap();
        let version = Arc::new(project.versions().unwrap().remove(0));
        (project, version)
    }

    #[test]
    fn test_registry() {
        assert_eq!(calculator_names(), vec!["projects", "summary", "violations"]);
        let config = BenchmarkConfig::default();
        assert_eq!(create_calculator("summary", &config).unwrap().name(), "summary");

        let err = create_calculator("nope", &config).err().unwrap();
        assert!(err.to_string().contains("available: projects, summary, violations"));
    }

    #[test]
    fn test_tally_ratios() {
        let tally = Tally {
            true_positives: 1,
            false_positives: 3,
            false_negatives: 1,
        };
        assert!((tally.precision() - 0.25).abs() < f64::EPSILON);
        assert!((tally.recall() - 0.5).abs() < f64::EPSILON);
        assert_eq!(Tally::default().precision(), 0.0);
    }

    #[tokio::test]
    async fn test_summary_reads_result_tables() {
        let temp = TempDir::new().unwrap();
        let (project, version) = version(&temp);
        let results = temp.path().join("results");
        write_atomic(
            &results.join("d/p/1").join(RESULT_FILE),
            "detector,project,version,misuse,classification,finding\n\
             d,p,1,m1,TP,f1\n\
             d,p,1,,FP,f2\n",
        )
        .unwrap();

        let config = BenchmarkConfig::default().with_results_path(&results);
        let mut calculator = SummaryCalculator::new(&config);
        calculator
            .run(&project, &version, &TaskContext::default())
            .await
            .unwrap();

        let tally = calculator.tallies()["d"];
        assert_eq!(tally.true_positives, 1);
        assert_eq!(tally.false_positives, 1);
        assert!(calculator.report().contains("50.0%"));
    }

    #[tokio::test]
    async fn test_corpus_calculators() {
        let temp = TempDir::new().unwrap();
        let (project, version) = version(&temp);
        let ctx = TaskContext::default();

        let mut violations = ViolationsCalculator::default();
        violations.run(&project, &version, &ctx).await.unwrap();
        assert_eq!(violations.counts()["missing/condition/null_check"], 1);

        let mut projects = ProjectsCalculator::default();
        projects.run(&project, &version, &ctx).await.unwrap();
        assert_eq!(
            projects.counts()["p"],
            ProjectCounts {
                versions: 1,
                misuses: 1,
                crashes: 0
            }
        );
    }
}
