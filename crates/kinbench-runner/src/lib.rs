use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{info, warn};

pub const BUILD_DIR: &str = "out";
pub const TEST_DIR: &str = "test";
pub const TEST_EXECUTABLE: &str = "speedtest";
pub const DEFAULT_REPEATS: usize = 10;

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("no mechanisms found for performance testing in {0}")]
    NoMechanisms(PathBuf),
    #[error("compilation failed for {file}: {message}")]
    CompileFailed { file: PathBuf, message: String },
    #[error("linking of test program failed: {message}")]
    LinkFailed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    OpenCl,
    C,
    Cuda,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::OpenCl => "opencl",
            Backend::C => "c",
            Backend::Cuda => "cuda",
        }
    }

    /// Backends whose executables need a device runtime resolved at link time.
    pub fn is_heterogeneous(&self) -> bool {
        matches!(self, Backend::OpenCl | Backend::Cuda)
    }

    fn source_extensions(&self) -> &'static [&'static str] {
        match self {
            Backend::OpenCl => &["c", "cl", "ocl"],
            Backend::C => &["c"],
            Backend::Cuda => &["cu", "c"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataOrder {
    /// Row-major.
    C,
    /// Column-major.
    F,
}

impl DataOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataOrder::C => "C",
            DataOrder::F => "F",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParallelMode {
    Wide,
    Deep,
    Plain,
}

impl ParallelMode {
    pub fn label(&self) -> &'static str {
        match self {
            ParallelMode::Wide => "w",
            ParallelMode::Deep => "d",
            ParallelMode::Plain => "par",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateSpecialization {
    Fixed,
    Hybrid,
    Full,
}

impl RateSpecialization {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateSpecialization::Fixed => "fixed",
            RateSpecialization::Hybrid => "hybrid",
            RateSpecialization::Full => "full",
        }
    }
}

/// One point in the sweep's option space. The ledger filename derived from it
/// is the persistent key for completed-run accounting, so the encoding must
/// stay deterministic and injective across distinct configurations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SweepConfig {
    pub backend: Backend,
    pub vector_width: u32,
    pub order: DataOrder,
    pub parallel: ParallelMode,
    pub platform: String,
    pub rate_spec: RateSpecialization,
    pub split_kernels: bool,
    pub num_cores: u32,
}

impl SweepConfig {
    /// Kernel splitting never combines with fixed rate specialization; those
    /// assignments are dropped from the sweep without a ledger entry.
    pub fn is_legal(&self) -> bool {
        !(self.split_kernels && self.rate_spec == RateSpecialization::Fixed)
    }

    pub fn ledger_file_name(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}_{}_{}_{}_output.txt",
            self.backend.as_str(),
            self.vector_width,
            self.order.as_str(),
            self.parallel.label(),
            self.platform,
            self.rate_spec.as_str(),
            if self.split_kernels { "split" } else { "single" },
            self.num_cores
        )
    }
}

impl fmt::Display for SweepConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} vec={} order={} {} platform={} rate_spec={} {} cores={}",
            self.backend.as_str(),
            self.vector_width,
            self.order.as_str(),
            self.parallel.label(),
            self.platform,
            self.rate_spec.as_str(),
            if self.split_kernels { "split" } else { "single" },
            self.num_cores
        )
    }
}

#[derive(Debug, Clone)]
pub struct Mechanism {
    pub name: String,
    pub dir: PathBuf,
    pub mech_file: PathBuf,
    pub data_file: PathBuf,
    pub thermo_file: Option<PathBuf>,
    pub species_count: usize,
}

/// Scans `work_dir` for subdirectories containing a `.cti` mechanism
/// definition. Mechanisms are returned in ascending species-count order so
/// cheap models surface failures before expensive ones.
pub fn discover_mechanisms(work_dir: &Path) -> Result<Vec<Mechanism>> {
    let mut mechanisms = Vec::new();
    for entry in fs::read_dir(work_dir)
        .with_context(|| format!("work directory not found: {}", work_dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let dir = entry.path();
        let mut files = Vec::new();
        for f in fs::read_dir(&dir)? {
            let f = f?;
            if f.file_type()?.is_file() {
                files.push(f.path());
            }
        }
        files.sort();
        let Some(mech_file) = files
            .iter()
            .find(|f| f.extension().and_then(|e| e.to_str()) == Some("cti"))
            .cloned()
        else {
            continue;
        };
        let thermo_file = files
            .iter()
            .find(|f| {
                f.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.contains("therm"))
                    .unwrap_or(false)
            })
            .cloned();
        let species_count = count_cti_species(&mech_file)?;
        let name = entry.file_name().to_string_lossy().to_string();
        mechanisms.push(Mechanism {
            name,
            data_file: dir.join("data.bin"),
            dir,
            mech_file,
            thermo_file,
            species_count,
        });
    }
    mechanisms.sort_by(|a, b| (a.species_count, &a.name).cmp(&(b.species_count, &b.name)));
    Ok(mechanisms)
}

/// Counts the entries of the `species = """..."""` block in a cti mechanism
/// definition. Handles both triple-quoted and single-quoted species fields.
pub fn count_cti_species(path: &Path) -> Result<usize> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read mechanism file {}", path.display()))?;
    for (idx, _) in text.match_indices("species") {
        let rest = text[idx + "species".len()..].trim_start();
        let Some(rest) = rest.strip_prefix('=') else {
            continue;
        };
        let rest = rest.trim_start();
        let body = if let Some(inner) = rest.strip_prefix("\"\"\"") {
            let end = inner
                .find("\"\"\"")
                .ok_or_else(|| anyhow!("unterminated species block in {}", path.display()))?;
            &inner[..end]
        } else if let Some(inner) = rest.strip_prefix('"') {
            let end = inner
                .find('"')
                .ok_or_else(|| anyhow!("unterminated species field in {}", path.display()))?;
            &inner[..end]
        } else {
            continue;
        };
        return Ok(body.split_whitespace().count());
    }
    Err(anyhow!("no species declaration found in {}", path.display()))
}

/// Outcome of parsing one ledger line. Malformed lines are an explicit,
/// non-fatal `Skip` branch: excluded from the completed count, never
/// repaired, never aborting the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerLine {
    Valid { key: u64 },
    Skip,
}

/// Parses one comma-separated ledger record. The line is valid only if it has
/// exactly `arity` fields, the first parses as an unsigned integer key and the
/// remainder parse as floats.
pub fn parse_ledger_line(line: &str, arity: usize) -> LedgerLine {
    let fields: Vec<&str> = line.trim().split(',').collect();
    if fields.len() != arity {
        return LedgerLine::Skip;
    }
    let Ok(key) = fields[0].trim().parse::<u64>() else {
        return LedgerLine::Skip;
    };
    for field in &fields[1..] {
        if field.trim().parse::<f64>().is_err() {
            return LedgerLine::Skip;
        }
    }
    LedgerLine::Valid { key }
}

/// Completed-run count for the 4-field `run_index,t1,t2,t3` ledger schema.
/// A missing file means zero completed runs, not an error.
pub fn completed_runs(path: &Path) -> usize {
    let Ok(text) = fs::read_to_string(path) else {
        return 0;
    };
    text.lines()
        .filter(|line| matches!(parse_ledger_line(line, 4), LedgerLine::Valid { .. }))
        .count()
}

/// Completed-run counts for the 2-field `step_count,elapsed_time` ledger
/// schema, grouped per requested step count.
pub fn completed_runs_by_step(path: &Path, steps: &[u64]) -> BTreeMap<u64, usize> {
    let mut runs: BTreeMap<u64, usize> = steps.iter().map(|s| (*s, 0)).collect();
    let Ok(text) = fs::read_to_string(path) else {
        return runs;
    };
    for line in text.lines() {
        if let LedgerLine::Valid { key } = parse_ledger_line(line, 2) {
            if let Some(count) = runs.get_mut(&key) {
                *count += 1;
            }
        }
    }
    runs
}

/// Smallest value of the form `max_vector_width * 2^k` (k >= 0) that is at
/// least `num_conditions`.
pub fn step_size(max_vector_width: u64, num_conditions: u64) -> u64 {
    let mut size = max_vector_width.max(1);
    while size < num_conditions {
        size = size.saturating_mul(2);
    }
    size
}

/// The wide and deep vectorization strategies are mutually exclusive; only one
/// of them participates in a given backend's axis set. `Plain` stands in when
/// neither applies and is the default for a `false` candidate.
#[derive(Debug, Clone)]
pub enum ParallelAxis {
    Wide(Vec<bool>),
    Deep(Vec<bool>),
    Plain,
}

impl ParallelAxis {
    fn modes(&self) -> Vec<ParallelMode> {
        match self {
            ParallelAxis::Wide(vals) => vals
                .iter()
                .map(|&v| if v { ParallelMode::Wide } else { ParallelMode::Plain })
                .collect(),
            ParallelAxis::Deep(vals) => vals
                .iter()
                .map(|&v| if v { ParallelMode::Deep } else { ParallelMode::Plain })
                .collect(),
            ParallelAxis::Plain => vec![ParallelMode::Plain],
        }
    }
}

/// Candidate values for every axis of one backend's option space.
#[derive(Debug, Clone)]
pub struct SweepSpace {
    pub backend: Backend,
    pub vector_widths: Vec<u32>,
    pub orders: Vec<DataOrder>,
    pub parallel: ParallelAxis,
    pub platforms: Vec<String>,
    pub rate_specs: Vec<RateSpecialization>,
    pub split_kernels: Vec<bool>,
    pub num_cores: Vec<u32>,
}

impl SweepSpace {
    /// The OpenCL sweep used for species-rate benchmarking.
    pub fn opencl_default(platforms: Vec<String>, num_cores: Vec<u32>) -> Self {
        SweepSpace {
            backend: Backend::OpenCl,
            vector_widths: vec![4, 8, 16],
            orders: vec![DataOrder::F, DataOrder::C],
            parallel: ParallelAxis::Wide(vec![true, false]),
            platforms,
            rate_specs: vec![RateSpecialization::Fixed, RateSpecialization::Hybrid],
            split_kernels: vec![true, false],
            num_cores,
        }
    }

    pub fn max_vector_width(&self) -> u32 {
        self.vector_widths.iter().copied().max().unwrap_or(1)
    }

    pub fn configs(&self) -> ConfigIter {
        ConfigIter::new(self)
    }
}

/// Powers of two up to half the host's logical processors, never empty.
pub fn default_num_cores() -> Vec<u32> {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1) as u32;
    let mut cores = Vec::new();
    let mut nc = 1;
    while nc < cpus / 2 {
        cores.push(nc);
        nc *= 2;
    }
    if cores.is_empty() {
        cores.push(1);
    }
    cores
}

fn non_empty<T: Clone>(values: &[T], default: T) -> Vec<T> {
    if values.is_empty() {
        vec![default]
    } else {
        values.to_vec()
    }
}

/// Lazy odometer over the Cartesian option space. Data order is the slowest
/// axis so configurations sharing a layout stay adjacent and the expensive
/// data rewrite fires at most once per layout per mechanism. Illegal and
/// duplicate assignments are filtered out; iteration order is deterministic,
/// which keeps resumed sweeps revisiting configurations in a stable sequence.
pub struct ConfigIter {
    backend: Backend,
    orders: Vec<DataOrder>,
    widths: Vec<u32>,
    modes: Vec<ParallelMode>,
    platforms: Vec<String>,
    rate_specs: Vec<RateSpecialization>,
    splits: Vec<bool>,
    cores: Vec<u32>,
    idx: [usize; 7],
    exhausted: bool,
    seen: BTreeSet<String>,
}

impl ConfigIter {
    fn new(space: &SweepSpace) -> Self {
        ConfigIter {
            backend: space.backend,
            orders: non_empty(&space.orders, DataOrder::C),
            widths: non_empty(&space.vector_widths, 1),
            modes: non_empty(&space.parallel.modes(), ParallelMode::Plain),
            platforms: non_empty(&space.platforms, String::new()),
            rate_specs: non_empty(&space.rate_specs, RateSpecialization::Hybrid),
            splits: non_empty(&space.split_kernels, false),
            cores: non_empty(&space.num_cores, 1),
            idx: [0; 7],
            exhausted: false,
            seen: BTreeSet::new(),
        }
    }

    fn current(&self) -> SweepConfig {
        SweepConfig {
            backend: self.backend,
            order: self.orders[self.idx[0]],
            vector_width: self.widths[self.idx[1]],
            parallel: self.modes[self.idx[2]],
            platform: self.platforms[self.idx[3]].clone(),
            rate_spec: self.rate_specs[self.idx[4]],
            split_kernels: self.splits[self.idx[5]],
            num_cores: self.cores[self.idx[6]],
        }
    }

    fn advance(&mut self) {
        let dims = [
            self.orders.len(),
            self.widths.len(),
            self.modes.len(),
            self.platforms.len(),
            self.rate_specs.len(),
            self.splits.len(),
            self.cores.len(),
        ];
        for axis in (0..dims.len()).rev() {
            self.idx[axis] += 1;
            if self.idx[axis] < dims[axis] {
                return;
            }
            self.idx[axis] = 0;
        }
        self.exhausted = true;
    }
}

impl Iterator for ConfigIter {
    type Item = SweepConfig;

    fn next(&mut self) -> Option<SweepConfig> {
        loop {
            if self.exhausted {
                return None;
            }
            let config = self.current();
            self.advance();
            if !config.is_legal() {
                continue;
            }
            if !self.seen.insert(config.ledger_file_name()) {
                continue;
            }
            return Some(config);
        }
    }
}

#[derive(Debug)]
pub struct GenerateRequest<'a> {
    pub config: &'a SweepConfig,
    pub mechanism: &'a Mechanism,
    pub build_dir: &'a Path,
    pub step_size: u64,
}

#[derive(Debug, Clone)]
pub struct SourceSet {
    pub files: Vec<PathBuf>,
    pub include_dirs: Vec<PathBuf>,
}

/// The narrow call contract to the external generator/compiler/linker
/// subsystem and to the timing executable. The sweep core only orchestrates;
/// everything behind this trait blocks until the underlying process exits.
pub trait SweepTools: Sync {
    /// Rewrites the mechanism's numeric dataset in the given layout and
    /// returns the number of conditions it holds.
    fn rewrite_data(&self, mechanism: &Mechanism, order: DataOrder) -> Result<u64>;

    /// Invokes the external kinetics code generator for one configuration.
    fn generate(&self, request: &GenerateRequest) -> Result<()>;

    /// Enumerates generated translation units and include directories.
    fn source_files(&self, build_dir: &Path, backend: Backend) -> Result<SourceSet>;

    /// Compiles one translation unit into `obj_dir`.
    fn compile(
        &self,
        source: &Path,
        include_dirs: &[PathBuf],
        obj_dir: &Path,
        backend: Backend,
    ) -> Result<()>;

    /// Links the object files into the timing executable and returns its path.
    fn link(
        &self,
        backend: Backend,
        objects: &[PathBuf],
        test_dir: &Path,
        platform: &str,
    ) -> Result<PathBuf>;

    /// Runs the timing executable once, appending its full output to the
    /// configuration's ledger before returning.
    fn run_timing(
        &self,
        executable: &Path,
        step_size: u64,
        num_cores: u32,
        ledger: &Path,
    ) -> Result<()>;
}

/// Site-specific knobs: the generator command and the table of known platform
/// substrings to device runtime library paths. Loaded from `site.yaml` in the
/// work directory when present.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConf {
    pub generator_command: Vec<String>,
    pub runtime_lib_paths: BTreeMap<String, String>,
    pub static_link: bool,
}

impl Default for SiteConf {
    fn default() -> Self {
        let mut runtime_lib_paths = BTreeMap::new();
        runtime_lib_paths.insert("intel".to_string(), "/opt/intel/opencl/lib64".to_string());
        runtime_lib_paths.insert("nvidia".to_string(), "/usr/local/cuda/lib64".to_string());
        runtime_lib_paths.insert(
            "amd".to_string(),
            "/opt/amdgpu-pro/lib/x86_64-linux-gnu".to_string(),
        );
        SiteConf {
            generator_command: vec!["kingen".to_string()],
            runtime_lib_paths,
            static_link: false,
        }
    }
}

impl SiteConf {
    pub fn load(work_dir: &Path) -> Result<Self> {
        let path = work_dir.join("site.yaml");
        if !path.exists() {
            return Ok(SiteConf::default());
        }
        let raw = fs::read_to_string(&path)?;
        let conf: SiteConf = serde_yaml::from_str(&raw)
            .with_context(|| format!("invalid site configuration {}", path.display()))?;
        if conf.generator_command.is_empty() {
            return Err(anyhow!("generator_command must not be empty"));
        }
        Ok(conf)
    }

    /// Case-insensitive substring match of the platform against the known
    /// runtime path table.
    pub fn runtime_lib_path(&self, platform: &str) -> Option<&str> {
        let needle = platform.to_lowercase();
        self.runtime_lib_paths
            .iter()
            .find(|(key, _)| needle.contains(key.as_str()))
            .map(|(_, path)| path.as_str())
    }
}

/// Subprocess-backed implementation of the collaborator contract.
pub struct ProcessTools {
    site: SiteConf,
    home: PathBuf,
}

impl ProcessTools {
    /// `home` is the source-tree root; generated code includes headers from it.
    pub fn new(site: SiteConf, home: PathBuf) -> Self {
        ProcessTools { site, home }
    }
}

fn object_path(source: &Path, obj_dir: &Path) -> PathBuf {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "source".to_string());
    obj_dir.join(format!("{}.o", name))
}

impl SweepTools for ProcessTools {
    fn rewrite_data(&self, mechanism: &Mechanism, order: DataOrder) -> Result<u64> {
        write_data_bin(&mechanism.dir, &mechanism.data_file, order)
    }

    fn generate(&self, request: &GenerateRequest) -> Result<()> {
        let command = &self.site.generator_command;
        let mut cmd = Command::new(&command[0]);
        cmd.args(&command[1..]);
        cmd.arg("--lang").arg(request.config.backend.as_str());
        cmd.arg("--mech").arg(&request.mechanism.mech_file);
        cmd.arg("--vector-size")
            .arg(request.config.vector_width.to_string());
        cmd.arg("--build-path").arg(request.build_dir);
        cmd.arg("--platform").arg(&request.config.platform);
        cmd.arg("--data-file").arg(&request.mechanism.data_file);
        cmd.arg("--rate-specialization")
            .arg(request.config.rate_spec.as_str());
        cmd.arg("--step-size").arg(request.step_size.to_string());
        // This sweep measures species-rate evaluation, never Jacobian assembly.
        cmd.arg("--skip-jacobian");
        match request.config.parallel {
            ParallelMode::Wide => {
                cmd.arg("--wide");
            }
            ParallelMode::Deep => {
                cmd.arg("--deep");
            }
            ParallelMode::Plain => {}
        }
        if request.config.split_kernels {
            cmd.arg("--split-rate-kernels");
            cmd.arg("--split-rop-net-kernels");
        }
        let status = cmd
            .status()
            .with_context(|| format!("failed to launch generator {}", command[0]))?;
        if !status.success() {
            return Err(anyhow!("generator exited with {}", status));
        }
        Ok(())
    }

    fn source_files(&self, build_dir: &Path, backend: Backend) -> Result<SourceSet> {
        let extensions = backend.source_extensions();
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(build_dir) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if extensions.contains(&ext) {
                files.push(path.to_path_buf());
            }
        }
        files.sort();
        Ok(SourceSet {
            files,
            include_dirs: vec![build_dir.to_path_buf(), self.home.clone()],
        })
    }

    fn compile(
        &self,
        source: &Path,
        include_dirs: &[PathBuf],
        obj_dir: &Path,
        backend: Backend,
    ) -> Result<()> {
        let (compiler, flags): (&str, &[&str]) = match backend {
            Backend::C | Backend::OpenCl => ("gcc", &["-O3", "-std=c99", "-fopenmp", "-fPIC"]),
            Backend::Cuda => ("nvcc", &["-O3", "-Xcompiler", "-fPIC"]),
        };
        let mut cmd = Command::new(compiler);
        cmd.args(flags);
        cmd.arg("-c").arg(source);
        for dir in include_dirs {
            cmd.arg("-I").arg(dir);
        }
        cmd.arg("-o").arg(object_path(source, obj_dir));
        let status = cmd
            .status()
            .with_context(|| format!("failed to launch {}", compiler))?;
        if !status.success() {
            return Err(anyhow!("{} exited with {}", compiler, status));
        }
        Ok(())
    }

    fn link(
        &self,
        backend: Backend,
        objects: &[PathBuf],
        test_dir: &Path,
        platform: &str,
    ) -> Result<PathBuf> {
        let shared = !self.site.static_link;
        let linker = match backend {
            Backend::OpenCl | Backend::C => "gcc",
            Backend::Cuda => {
                if shared {
                    "g++"
                } else {
                    "nvcc"
                }
            }
        };
        let executable = test_dir.join(TEST_EXECUTABLE);
        let mut cmd = Command::new(linker);
        if matches!(backend, Backend::OpenCl | Backend::C) {
            cmd.arg("-fopenmp");
        }
        cmd.args(objects);
        cmd.arg("-o").arg(&executable);
        match backend {
            Backend::OpenCl => {
                cmd.arg("-lOpenCL");
            }
            Backend::Cuda => {
                cmd.arg("-lcudart");
            }
            Backend::C => {}
        }
        if backend.is_heterogeneous() {
            if let Some(rpath) = self.site.runtime_lib_path(platform) {
                cmd.arg("-Wl,-rpath").arg(rpath);
                cmd.arg("-L").arg(rpath);
            }
        }
        cmd.arg("-lm");
        let status = cmd
            .status()
            .with_context(|| format!("failed to launch {}", linker))?;
        if !status.success() {
            return Err(anyhow!("{} exited with {}", linker, status));
        }
        Ok(executable)
    }

    fn run_timing(
        &self,
        executable: &Path,
        step_size: u64,
        num_cores: u32,
        ledger: &Path,
    ) -> Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(ledger)?;
        let status = Command::new(executable)
            .arg(step_size.to_string())
            .arg(num_cores.to_string())
            .stdout(Stdio::from(file))
            .status()
            .with_context(|| format!("failed to launch {}", executable.display()))?;
        if !status.success() {
            return Err(anyhow!("timing executable exited with {}", status));
        }
        Ok(())
    }
}

/// Concatenates the mechanism's condition rows (CSV text files of floats) and
/// writes them to `data_file` as little-endian f64 in the requested layout.
/// Returns the condition count.
pub fn write_data_bin(mech_dir: &Path, data_file: &Path, order: DataOrder) -> Result<u64> {
    let mut sources = Vec::new();
    for entry in fs::read_dir(mech_dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file()
            && path.extension().and_then(|e| e.to_str()) == Some("csv")
        {
            sources.push(path);
        }
    }
    sources.sort();
    if sources.is_empty() {
        return Err(anyhow!("no condition data found in {}", mech_dir.display()));
    }

    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut width = None;
    for source in &sources {
        let text = fs::read_to_string(source)?;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let row = line
                .split(',')
                .map(|field| {
                    field.trim().parse::<f64>().map_err(|_| {
                        anyhow!("invalid condition value '{}' in {}", field, source.display())
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            match width {
                None => width = Some(row.len()),
                Some(w) if w != row.len() => {
                    return Err(anyhow!(
                        "ragged condition row in {}: expected {} fields, found {}",
                        source.display(),
                        w,
                        row.len()
                    ));
                }
                Some(_) => {}
            }
            rows.push(row);
        }
    }

    let width = width.unwrap_or(0);
    let mut bytes = Vec::with_capacity(rows.len() * width * 8);
    match order {
        DataOrder::C => {
            for row in &rows {
                for value in row {
                    bytes.extend_from_slice(&value.to_le_bytes());
                }
            }
        }
        DataOrder::F => {
            for col in 0..width {
                for row in &rows {
                    bytes.extend_from_slice(&row[col].to_le_bytes());
                }
            }
        }
    }
    fs::write(data_file, bytes)?;
    Ok(rows.len() as u64)
}

/// Per-mechanism sweep context. Tracks the directory layout and the layout of
/// the last data rewrite so unchanged layouts skip the rewrite entirely.
pub struct SweepSession {
    pub build_dir: PathBuf,
    pub test_dir: PathBuf,
    current_order: Option<DataOrder>,
    num_conditions: u64,
}

impl SweepSession {
    pub fn new(mech_dir: &Path) -> Result<Self> {
        let build_dir = mech_dir.join(BUILD_DIR);
        let test_dir = mech_dir.join(TEST_DIR);
        fs::create_dir_all(&build_dir)?;
        fs::create_dir_all(&test_dir)?;
        Ok(SweepSession {
            build_dir,
            test_dir,
            current_order: None,
            num_conditions: 0,
        })
    }
}

/// Result of driving one configuration through generate/compile/link.
/// Generation failure is a recoverable branch; compile and link failures are
/// sweep-fatal errors.
#[derive(Debug)]
pub enum BuildOutcome {
    Built { executable: PathBuf, step_size: u64 },
    GenerationFailed,
}

pub fn build_config(
    tools: &dyn SweepTools,
    session: &mut SweepSession,
    mechanism: &Mechanism,
    config: &SweepConfig,
    max_vector_width: u32,
) -> Result<BuildOutcome> {
    if session.current_order != Some(config.order) {
        let conditions = tools.rewrite_data(mechanism, config.order)?;
        session.current_order = Some(config.order);
        session.num_conditions = conditions;
    }
    let step = step_size(max_vector_width as u64, session.num_conditions);

    let request = GenerateRequest {
        config,
        mechanism,
        build_dir: &session.build_dir,
        step_size: step,
    };
    if let Err(err) = tools.generate(&request) {
        warn!(config = %config, error = %err, "code generation failed, skipping configuration");
        return Ok(BuildOutcome::GenerationFailed);
    }

    let sources = tools.source_files(&session.build_dir, config.backend)?;
    let test_dir = session.test_dir.clone();
    let results: Vec<(PathBuf, Result<()>)> = sources
        .files
        .par_iter()
        .map(|file| {
            let result = tools.compile(file, &sources.include_dirs, &test_dir, config.backend);
            (file.clone(), result)
        })
        .collect();
    for (file, result) in results {
        if let Err(err) = result {
            return Err(SweepError::CompileFailed {
                file,
                message: err.to_string(),
            }
            .into());
        }
    }

    let objects: Vec<PathBuf> = sources
        .files
        .iter()
        .map(|file| object_path(file, &session.test_dir))
        .collect();
    let executable = tools
        .link(config.backend, &objects, &session.test_dir, &config.platform)
        .map_err(|err| SweepError::LinkFailed {
            message: err.to_string(),
        })?;
    Ok(BuildOutcome::Built {
        executable,
        step_size: step,
    })
}

/// Runs the timing executable once per outstanding trial, strictly
/// sequentially so each invocation's output lands in the ledger before the
/// next one starts.
pub fn run_trials(
    tools: &dyn SweepTools,
    executable: &Path,
    step_size: u64,
    num_cores: u32,
    deficit: usize,
    ledger: &Path,
) -> Result<()> {
    for run in 0..deficit {
        info!(run = run + 1, total = deficit, "timing trial");
        tools.run_timing(executable, step_size, num_cores, ledger)?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub work_dir: PathBuf,
    pub repeats: usize,
    pub space: SweepSpace,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    pub started_at: String,
    pub finished_at: String,
    pub mechanisms: usize,
    pub configurations: usize,
    pub skipped: usize,
    pub generation_failures: usize,
    pub trials_run: usize,
}

/// Drives the whole sweep: discover mechanisms, enumerate configurations,
/// consult the ledger, and build + execute the outstanding deficit. The ledger
/// files are the only persistent state; re-running after an abort resumes from
/// the correct deficit without redoing completed trials.
pub fn run_sweep(tools: &dyn SweepTools, opts: &SweepOptions) -> Result<SweepSummary> {
    let started_at = Utc::now().to_rfc3339();
    let work_dir = opts
        .work_dir
        .canonicalize()
        .map_err(|_| anyhow!("work directory not found: {}", opts.work_dir.display()))?;
    let mechanisms = discover_mechanisms(&work_dir)?;
    if mechanisms.is_empty() {
        return Err(SweepError::NoMechanisms(work_dir).into());
    }

    let max_vector_width = opts.space.max_vector_width();
    let mut configurations = 0usize;
    let mut skipped = 0usize;
    let mut generation_failures = 0usize;
    let mut trials_run = 0usize;

    for mechanism in &mechanisms {
        info!(
            mechanism = %mechanism.name,
            species = mechanism.species_count,
            "benchmarking mechanism"
        );
        let mut session = SweepSession::new(&mechanism.dir)?;
        for config in opts.space.configs() {
            configurations += 1;
            let ledger = mechanism.dir.join(config.ledger_file_name());
            let completed = completed_runs(&ledger);
            let deficit = opts.repeats.saturating_sub(completed);
            if deficit == 0 {
                skipped += 1;
                continue;
            }
            match build_config(tools, &mut session, mechanism, &config, max_vector_width)? {
                BuildOutcome::GenerationFailed => {
                    generation_failures += 1;
                }
                BuildOutcome::Built {
                    executable,
                    step_size,
                } => {
                    run_trials(
                        tools,
                        &executable,
                        step_size,
                        config.num_cores,
                        deficit,
                        &ledger,
                    )?;
                    trials_run += deficit;
                }
            }
        }
    }

    Ok(SweepSummary {
        started_at,
        finished_at: Utc::now().to_rfc3339(),
        mechanisms: mechanisms.len(),
        configurations,
        skipped,
        generation_failures,
        trials_run,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    fn temp_root(label: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!(
            "kinbench_{}_{}_{}",
            label,
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        fs::create_dir_all(&root).expect("temp root");
        root
    }

    fn small_space() -> SweepSpace {
        SweepSpace {
            backend: Backend::OpenCl,
            vector_widths: vec![4, 8],
            orders: vec![DataOrder::F, DataOrder::C],
            parallel: ParallelAxis::Wide(vec![true, false]),
            platforms: vec!["intel".to_string()],
            rate_specs: vec![RateSpecialization::Fixed, RateSpecialization::Hybrid],
            split_kernels: vec![true, false],
            num_cores: vec![1],
        }
    }

    fn write_mechanism(work_dir: &Path, name: &str, species: &str) -> PathBuf {
        let dir = work_dir.join(name);
        fs::create_dir_all(&dir).expect("mech dir");
        let cti = format!(
            "ideal_gas(name='gas',\n    elements=\"H O N\",\n    species=\"\"\"{}\"\"\",\n    reactions='all')\n",
            species
        );
        fs::write(dir.join(format!("{}.cti", name)), cti).expect("cti");
        fs::write(
            dir.join("conditions.csv"),
            "1000.0,101325.0,0.5\n1200.0,101325.0,0.5\n",
        )
        .expect("conditions");
        dir
    }

    #[derive(Default)]
    struct MockTools {
        calls: Mutex<Vec<String>>,
        fail_generation_for: Option<String>,
        fail_compile: bool,
        conditions: u64,
    }

    impl MockTools {
        fn new(conditions: u64) -> Self {
            MockTools {
                conditions,
                ..MockTools::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().expect("calls lock").push(call);
        }
    }

    impl SweepTools for MockTools {
        fn rewrite_data(&self, _mechanism: &Mechanism, order: DataOrder) -> Result<u64> {
            self.record(format!("rewrite:{}", order.as_str()));
            Ok(self.conditions)
        }

        fn generate(&self, request: &GenerateRequest) -> Result<()> {
            let key = request.config.ledger_file_name();
            self.record(format!("generate:{}", key));
            if self.fail_generation_for.as_deref() == Some(key.as_str()) {
                return Err(anyhow!("mock generation failure"));
            }
            Ok(())
        }

        fn source_files(&self, build_dir: &Path, _backend: Backend) -> Result<SourceSet> {
            self.record("sources".to_string());
            Ok(SourceSet {
                files: vec![build_dir.join("rates.c"), build_dir.join("chem_utils.c")],
                include_dirs: vec![build_dir.to_path_buf()],
            })
        }

        fn compile(
            &self,
            source: &Path,
            _include_dirs: &[PathBuf],
            _obj_dir: &Path,
            _backend: Backend,
        ) -> Result<()> {
            self.record(format!(
                "compile:{}",
                source.file_name().unwrap().to_string_lossy()
            ));
            if self.fail_compile {
                return Err(anyhow!("mock compile failure"));
            }
            Ok(())
        }

        fn link(
            &self,
            _backend: Backend,
            _objects: &[PathBuf],
            test_dir: &Path,
            _platform: &str,
        ) -> Result<PathBuf> {
            self.record("link".to_string());
            Ok(test_dir.join(TEST_EXECUTABLE))
        }

        fn run_timing(
            &self,
            _executable: &Path,
            step_size: u64,
            num_cores: u32,
            ledger: &Path,
        ) -> Result<()> {
            self.record(format!("run:{}:{}", step_size, num_cores));
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(ledger)
                .expect("ledger append");
            writeln!(file, "0,0.125,0.25,0.5").expect("ledger line");
            Ok(())
        }
    }

    #[test]
    fn ledger_line_requires_exact_arity_and_numeric_fields() {
        assert_eq!(
            parse_ledger_line("3,0.1,0.2,0.3", 4),
            LedgerLine::Valid { key: 3 }
        );
        assert_eq!(parse_ledger_line("3,0.1,0.2", 4), LedgerLine::Skip);
        assert_eq!(parse_ledger_line("3,0.1,0.2,0.3,0.4", 4), LedgerLine::Skip);
        assert_eq!(parse_ledger_line("x,0.1,0.2,0.3", 4), LedgerLine::Skip);
        assert_eq!(parse_ledger_line("3,0.1,oops,0.3", 4), LedgerLine::Skip);
        assert_eq!(parse_ledger_line("", 4), LedgerLine::Skip);
        assert_eq!(
            parse_ledger_line("256,0.75", 2),
            LedgerLine::Valid { key: 256 }
        );
    }

    #[test]
    fn completed_runs_skips_malformed_lines() {
        let root = temp_root("ledger");
        let path = root.join("ledger.txt");
        fs::write(
            &path,
            "0,0.1,0.2,0.3\ngarbage\n1,0.1,0.2,0.3\n2,0.1\n\n3,0.1,0.2,0.3\n",
        )
        .expect("ledger");
        assert_eq!(completed_runs(&path), 3);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn completed_runs_missing_file_is_zero() {
        let root = temp_root("missing");
        assert_eq!(completed_runs(&root.join("nope.txt")), 0);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn completed_runs_by_step_groups_per_step() {
        let root = temp_root("steps");
        let path = root.join("ledger.txt");
        fs::write(&path, "64,0.5\n64,0.6\n128,0.7\nbad,line\n256,oops\n").expect("ledger");
        let runs = completed_runs_by_step(&path, &[64, 128, 256]);
        assert_eq!(runs[&64], 2);
        assert_eq!(runs[&128], 1);
        assert_eq!(runs[&256], 0);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn step_size_is_smallest_power_of_two_multiple() {
        assert_eq!(step_size(16, 100), 128);
        assert_eq!(step_size(16, 128), 128);
        assert_eq!(step_size(16, 129), 256);
        assert_eq!(step_size(16, 8), 16);
        assert_eq!(step_size(16, 16), 16);
        assert_eq!(step_size(8, 1), 8);
    }

    #[test]
    fn ledger_file_name_is_deterministic_and_injective() {
        let config = SweepConfig {
            backend: Backend::OpenCl,
            vector_width: 8,
            order: DataOrder::F,
            parallel: ParallelMode::Wide,
            platform: "intel".to_string(),
            rate_spec: RateSpecialization::Hybrid,
            split_kernels: false,
            num_cores: 4,
        };
        assert_eq!(
            config.ledger_file_name(),
            "opencl_8_F_w_intel_hybrid_single_4_output.txt"
        );
        assert_eq!(config.ledger_file_name(), config.ledger_file_name());

        let mut names = BTreeSet::new();
        for config in small_space().configs() {
            assert!(
                names.insert(config.ledger_file_name()),
                "duplicate ledger name for {}",
                config
            );
        }
    }

    #[test]
    fn enumerator_never_yields_split_with_fixed() {
        let mut yielded = 0;
        for config in small_space().configs() {
            assert!(
                !(config.split_kernels && config.rate_spec == RateSpecialization::Fixed),
                "illegal configuration yielded: {}",
                config
            );
            yielded += 1;
        }
        // 2 orders x 2 widths x 2 modes x 1 platform x 1 core count, with the
        // legal (rate_spec, split) pairs being (fixed, single),
        // (hybrid, split) and (hybrid, single).
        assert_eq!(yielded, 2 * 2 * 2 * 3);
    }

    #[test]
    fn enumerator_keeps_equal_layouts_adjacent() {
        let orders: Vec<DataOrder> = small_space().configs().map(|c| c.order).collect();
        let flips = orders.windows(2).filter(|w| w[0] != w[1]).count();
        assert_eq!(flips, 1, "layout axis must be the slowest: {:?}", orders);
    }

    #[test]
    fn enumerator_is_deterministic() {
        let space = small_space();
        let first: Vec<String> = space.configs().map(|c| c.ledger_file_name()).collect();
        let second: Vec<String> = space.configs().map(|c| c.ledger_file_name()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn cti_species_count_handles_multiline_blocks() {
        let root = temp_root("cti");
        let path = root.join("test.cti");
        fs::write(
            &path,
            "# test mechanism\nideal_gas(name='gas',\n    elements=\"H O\",\n    species=\"\"\"H2 O2 H2O\n               OH HO2\n               H2O2 N2 AR\"\"\",\n    reactions='all')\n",
        )
        .expect("cti");
        assert_eq!(count_cti_species(&path).expect("species"), 8);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn mechanisms_discovered_in_species_count_order() {
        let root = temp_root("discover");
        write_mechanism(&root, "big", "A B C D E F G H I J");
        write_mechanism(&root, "small", "H2 O2 H2O");
        fs::create_dir_all(root.join("no_mech_here")).expect("empty dir");
        let mechanisms = discover_mechanisms(&root).expect("discover");
        assert_eq!(mechanisms.len(), 2);
        assert_eq!(mechanisms[0].name, "small");
        assert_eq!(mechanisms[0].species_count, 3);
        assert_eq!(mechanisms[1].name, "big");
        assert_eq!(mechanisms[1].species_count, 10);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn data_bin_layouts_transpose() {
        let root = temp_root("databin");
        fs::write(root.join("conditions.csv"), "1.0,2.0\n3.0,4.0\n5.0,6.0\n").expect("csv");
        let data_file = root.join("data.bin");

        let n = write_data_bin(&root, &data_file, DataOrder::C).expect("row major");
        assert_eq!(n, 3);
        let bytes = fs::read(&data_file).expect("read");
        let values: Vec<f64> = bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        write_data_bin(&root, &data_file, DataOrder::F).expect("col major");
        let bytes = fs::read(&data_file).expect("read");
        let values: Vec<f64> = bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![1.0, 3.0, 5.0, 2.0, 4.0, 6.0]);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn runtime_lib_path_matches_substring_case_insensitively() {
        let site = SiteConf::default();
        assert_eq!(
            site.runtime_lib_path("Intel(R) OpenCL"),
            Some("/opt/intel/opencl/lib64")
        );
        assert_eq!(
            site.runtime_lib_path("NVIDIA CUDA"),
            Some("/usr/local/cuda/lib64")
        );
        assert_eq!(site.runtime_lib_path("pocl"), None);
    }

    #[test]
    fn sweep_populates_ledger_for_each_legal_config() {
        let root = temp_root("sweep");
        write_mechanism(&root, "testmech", "H2 O2 H2O OH HO2 H2O2 N2 AR");
        let tools = MockTools::new(24);
        let opts = SweepOptions {
            work_dir: root.clone(),
            repeats: 10,
            space: small_space(),
        };
        let summary = run_sweep(&tools, &opts).expect("sweep");
        assert_eq!(summary.mechanisms, 1);
        assert_eq!(summary.configurations, 24);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.trials_run, 240);

        let mech_dir = root.join("testmech");
        for config in opts.space.configs() {
            let ledger = mech_dir.join(config.ledger_file_name());
            assert!(ledger.exists(), "missing ledger for {}", config);
            assert_eq!(
                completed_runs(&ledger),
                10,
                "deficit not filled for {}",
                config
            );
        }
        // No ledger for any illegal split+fixed combination.
        let illegal = mech_dir.join("opencl_4_F_w_intel_fixed_split_1_output.txt");
        assert!(!illegal.exists());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn sweep_rewrites_data_once_per_layout() {
        let root = temp_root("rewrite");
        write_mechanism(&root, "testmech", "H2 O2 H2O");
        let tools = MockTools::new(24);
        let opts = SweepOptions {
            work_dir: root.clone(),
            repeats: 1,
            space: small_space(),
        };
        run_sweep(&tools, &opts).expect("sweep");
        let rewrites: Vec<String> = tools
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("rewrite:"))
            .collect();
        assert_eq!(
            rewrites,
            vec!["rewrite:F".to_string(), "rewrite:C".to_string()]
        );
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn full_ledger_short_circuits_all_work() {
        let root = temp_root("resume");
        let mech_dir = write_mechanism(&root, "testmech", "H2 O2 H2O");
        let space = small_space();
        for config in space.configs() {
            let mut lines = String::new();
            for i in 0..10 {
                lines.push_str(&format!("{},0.1,0.2,0.3\n", i));
            }
            fs::write(mech_dir.join(config.ledger_file_name()), lines).expect("prefill");
        }
        let tools = MockTools::new(24);
        let opts = SweepOptions {
            work_dir: root.clone(),
            repeats: 10,
            space,
        };
        let summary = run_sweep(&tools, &opts).expect("sweep");
        assert_eq!(summary.skipped, summary.configurations);
        assert_eq!(summary.trials_run, 0);
        assert!(
            tools.calls().is_empty(),
            "no collaborator may be invoked on a full ledger: {:?}",
            tools.calls()
        );
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn overfull_ledger_clamps_deficit_to_zero() {
        let root = temp_root("overfull");
        let mech_dir = write_mechanism(&root, "testmech", "H2 O2 H2O");
        let space = small_space();
        for config in space.configs() {
            let mut lines = String::new();
            for i in 0..12 {
                lines.push_str(&format!("{},0.1,0.2,0.3\n", i));
            }
            fs::write(mech_dir.join(config.ledger_file_name()), lines).expect("prefill");
        }
        let tools = MockTools::new(24);
        let opts = SweepOptions {
            work_dir: root.clone(),
            repeats: 10,
            space,
        };
        let summary = run_sweep(&tools, &opts).expect("sweep");
        assert_eq!(summary.trials_run, 0);
        assert!(tools.calls().is_empty());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn generation_failure_skips_config_but_not_sweep() {
        let root = temp_root("genfail");
        let mech_dir = write_mechanism(&root, "testmech", "H2 O2 H2O");
        let space = small_space();
        let doomed = space.configs().next().expect("first config");
        let tools = MockTools {
            fail_generation_for: Some(doomed.ledger_file_name()),
            conditions: 24,
            ..MockTools::default()
        };
        let opts = SweepOptions {
            work_dir: root.clone(),
            repeats: 2,
            space,
        };
        let summary = run_sweep(&tools, &opts).expect("sweep survives generation failure");
        assert_eq!(summary.generation_failures, 1);
        assert_eq!(summary.trials_run, 2 * (summary.configurations - 1));
        assert!(!mech_dir.join(doomed.ledger_file_name()).exists());
        for config in opts.space.configs().skip(1) {
            assert_eq!(completed_runs(&mech_dir.join(config.ledger_file_name())), 2);
        }
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn compile_failure_aborts_the_sweep() {
        let root = temp_root("compilefail");
        write_mechanism(&root, "testmech", "H2 O2 H2O");
        let tools = MockTools {
            fail_compile: true,
            conditions: 24,
            ..MockTools::default()
        };
        let opts = SweepOptions {
            work_dir: root.clone(),
            repeats: 1,
            space: small_space(),
        };
        let err = run_sweep(&tools, &opts).expect_err("compile failure must be fatal");
        match err.downcast_ref::<SweepError>() {
            Some(SweepError::CompileFailed { .. }) => {}
            other => panic!("expected CompileFailed, got {:?}", other),
        }
        assert_eq!(
            tools.calls().iter().filter(|c| c.as_str() == "link").count(),
            0,
            "no link may happen after a compile failure"
        );
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn empty_work_dir_is_fatal() {
        let root = temp_root("empty");
        let tools = MockTools::new(24);
        let opts = SweepOptions {
            work_dir: root.clone(),
            repeats: 1,
            space: small_space(),
        };
        let err = run_sweep(&tools, &opts).expect_err("zero mechanisms must be fatal");
        match err.downcast_ref::<SweepError>() {
            Some(SweepError::NoMechanisms(_)) => {}
            other => panic!("expected NoMechanisms, got {:?}", other),
        }
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn default_core_counts_never_empty() {
        let cores = default_num_cores();
        assert!(!cores.is_empty());
        assert!(cores.iter().all(|&c| c.is_power_of_two()));
    }
}
