//! Compiler driver command generation.
//!
//! maf drives a GCC-compatible compiler (clang by default). The C++
//! compiler doubles as the linker so that C++ runtimes are picked up.

use std::collections::HashSet;
use std::path::Path;

use crate::builder::plan::{Binary, ObjectFile};
use crate::core::{BuildType, Language};
use crate::util::config::ToolchainSettings;
use crate::util::context::GlobalContext;
use crate::util::process::{find_executable, ProcessBuilder};

const DEFAULT_CC: &str = "clang";
const DEFAULT_CXX: &str = "clang++";

/// Resolved compilers and flags shared by every build type.
#[derive(Debug, Clone, Default)]
pub struct Toolchain {
    /// C compiler
    pub cc: String,

    /// C++ compiler and linker
    pub cxx: String,

    pub common_flags: Vec<String>,
    pub c_flags: Vec<String>,
    pub cxx_flags: Vec<String>,
    pub link_flags: Vec<String>,

    /// Project macros, `NAME` or `NAME=VALUE`, passed as `-D`.
    pub defines: Vec<String>,

    /// Macros the compiler predefines.
    pub builtin_macros: HashSet<String>,
}

impl Toolchain {
    /// Resolve the toolchain from `maf.toml` settings and the environment.
    ///
    /// `CC` and `CXX` override the configured compilers. Words of
    /// `CXXFLAGS` are appended to the common compile flags and each word of
    /// `LDFLAGS` is passed to the linker as `-Wl,<word>`.
    pub fn from_config(settings: &ToolchainSettings, defines: &[String]) -> Self {
        Self::from_parts(
            settings,
            defines,
            std::env::var("CC").ok(),
            std::env::var("CXX").ok(),
            std::env::var("CXXFLAGS").ok(),
            std::env::var("LDFLAGS").ok(),
        )
    }

    fn from_parts(
        settings: &ToolchainSettings,
        defines: &[String],
        env_cc: Option<String>,
        env_cxx: Option<String>,
        env_cxxflags: Option<String>,
        env_ldflags: Option<String>,
    ) -> Self {
        let pick = |env: Option<String>, configured: &Option<String>, fallback: &str| {
            env.filter(|v| !v.trim().is_empty())
                .or_else(|| configured.clone())
                .unwrap_or_else(|| fallback.to_string())
        };
        let cc = pick(env_cc, &settings.cc, DEFAULT_CC);
        let cxx = pick(env_cxx, &settings.cxx, DEFAULT_CXX);

        let mut common_flags = settings.common_flags.clone();
        if let Some(flags) = env_cxxflags {
            common_flags.extend(flags.split_whitespace().map(str::to_string));
        }

        let mut link_flags = settings.link_flags.clone();
        if let Some(flags) = env_ldflags {
            link_flags.extend(flags.split_whitespace().map(|f| format!("-Wl,{}", f)));
        }

        let mut toolchain = Toolchain {
            cc,
            cxx,
            common_flags,
            c_flags: settings.c_flags.clone(),
            cxx_flags: settings.cxx_flags.clone(),
            link_flags,
            defines: defines.to_vec(),
            builtin_macros: HashSet::new(),
        };

        if settings.query_defines {
            toolchain.builtin_macros = query_builtin_macros(&toolchain.cc);
        }
        toolchain
    }

    /// Warn about compilers that are not on `PATH`.
    pub fn check_compilers(&self) {
        for compiler in [&self.cc, &self.cxx] {
            if find_executable(compiler).is_none() {
                tracing::warn!("compiler `{}` not found", compiler);
            }
        }
    }

    /// Macro names treated as defined when scanning sources.
    pub fn scan_defines(&self) -> HashSet<String> {
        let mut names = self.builtin_macros.clone();
        names.extend(
            self.defines
                .iter()
                .map(|d| d.split_once('=').map_or(d.as_str(), |(name, _)| name).to_string()),
        );
        names
    }

    pub fn compiler(&self, lang: Language) -> &str {
        match lang {
            Language::C => &self.cc,
            Language::Cxx => &self.cxx,
        }
    }

    /// Command compiling one object file.
    pub fn compile_command(
        &self,
        ctx: &GlobalContext,
        object: &ObjectFile,
        build_type: &BuildType,
    ) -> ProcessBuilder {
        let flags = match object.language {
            Language::C => &self.c_flags,
            Language::Cxx => &self.cxx_flags,
        };

        let compiler = self.compiler(object.language);
        let mut cmd = ProcessBuilder::new(compiler)
            .args(color_flags(compiler))
            .args(&self.common_flags)
            .args(flags)
            .args(&build_type.compile_flags)
            .args(self.defines.iter().map(|d| format!("-D{}", d)));

        let include = build_type.prefix.join("include");
        if ctx.resolve(&include).is_dir() {
            cmd = cmd.arg(format!("-I{}", include.display()));
        }

        cmd.args(&object.compile_args)
            .arg(&object.source)
            .args(["-c", "-o"])
            .arg(&object.path)
            .cwd(ctx.root())
    }

    /// Command linking one binary.
    pub fn link_command(
        &self,
        ctx: &GlobalContext,
        binary: &Binary,
        build_type: &BuildType,
    ) -> ProcessBuilder {
        let mut cmd = ProcessBuilder::new(&self.cxx)
            .args(color_flags(&self.cxx))
            .args(&binary.objects)
            .args(&self.link_flags)
            .args(&build_type.link_flags);

        let lib = build_type.prefix.join("lib");
        if ctx.resolve(&lib).is_dir() {
            cmd = cmd.arg(format!("-L{}", lib.display()));
        }

        cmd.args(&binary.link_args)
            .arg("-o")
            .arg(&binary.path)
            .cwd(ctx.root())
    }
}

fn is_clang(compiler: &str) -> bool {
    Path::new(compiler)
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.contains("clang"))
}

/// stderr goes to a file, so clang would drop colors without this.
fn color_flags(compiler: &str) -> &'static [&'static str] {
    if is_clang(compiler) {
        &["-fcolor-diagnostics"]
    } else {
        &[]
    }
}

/// Ask the C compiler for its predefined macros.
///
/// Failures are logged and yield an empty set, which only makes `#ifdef`
/// evaluation less precise.
pub fn query_builtin_macros(cc: &str) -> HashSet<String> {
    let output = match ProcessBuilder::new(cc).args(["-dM", "-E", "-"]).exec() {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!("could not query predefined macros: {:#}", e);
            return HashSet::new();
        }
    };
    if !output.status.success() {
        tracing::warn!(
            "`{} -dM -E -` failed ({}), assuming no predefined macros",
            cc,
            output.status
        );
        return HashSet::new();
    }
    parse_macro_dump(&String::from_utf8_lossy(&output.stdout))
}

/// Extract macro names from `#define NAME VALUE` lines.
fn parse_macro_dump(dump: &str) -> HashSet<String> {
    dump.lines()
        .filter_map(|line| {
            let mut words = line.split_whitespace();
            match words.next() {
                Some("#define") => words.next(),
                _ => None,
            }
        })
        .map(|name| name.split('(').next().unwrap_or(name).to_string())
        .collect()
}
