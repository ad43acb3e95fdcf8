//! Dynamic loading of vendor driver libraries.
//!
//! [`DriverLibrary`] wraps a `libloading` handle. Opening walks a list of
//! candidate names and paths, and every failure lands in the caller's
//! [`Diagnostics`] as one bullet. The handle is closed when the value is
//! dropped; function pointers copied out of it must not outlive it.

use std::ffi::c_void;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use tracing::debug;

use crate::diagnostics::Diagnostics;
use crate::error::LoadError;

/// An opened vendor driver library.
pub struct DriverLibrary {
    library: Library,
    path: PathBuf,
}

impl std::fmt::Debug for DriverLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverLibrary")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl DriverLibrary {
    /// Open the first candidate that loads.
    ///
    /// Candidates are tried in order. If none loads, each loader message is
    /// appended to `diagnostics` and [`LoadError::LibraryNotFound`] is returned.
    pub fn open<I, P>(candidates: I, diagnostics: &mut Diagnostics) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut failures = Vec::new();
        for candidate in candidates {
            let candidate = candidate.as_ref();
            // SAFETY: vendor driver libraries run no initialization code that
            // depends on the caller's state; the handle is owned by `Self`.
            match unsafe { Library::new(candidate) } {
                Ok(library) => {
                    debug!(path = %candidate.display(), "opened driver library");
                    return Ok(Self {
                        library,
                        path: candidate.to_path_buf(),
                    });
                }
                Err(err) => {
                    debug!(
                        path = %candidate.display(),
                        error = %err,
                        "driver library candidate failed"
                    );
                    failures.push(err.to_string());
                }
            }
        }

        for failure in &failures {
            diagnostics.append(failure);
        }
        Err(LoadError::LibraryNotFound {
            tried: failures.len(),
        })
    }

    /// Open a library and check that it exports every symbol in `required`.
    pub fn load<I, P>(
        candidates: I,
        required: &[&str],
        diagnostics: &mut Diagnostics,
    ) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let library = Self::open(candidates, diagnostics)?;
        library.require(required, diagnostics)?;
        Ok(library)
    }

    /// Check that every symbol in `required` resolves.
    ///
    /// Each missing symbol is appended to `diagnostics`.
    pub fn require(
        &self,
        required: &[&str],
        diagnostics: &mut Diagnostics,
    ) -> Result<(), LoadError> {
        let mut missing = Vec::new();
        for &name in required {
            // SAFETY: the address is only inspected, never called.
            let lookup = unsafe { self.library.get::<*const c_void>(name.as_bytes()) };
            if let Err(err) = lookup {
                diagnostics.append(&err.to_string());
                missing.push(name.to_owned());
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(LoadError::MissingSymbols { symbols: missing })
        }
    }

    /// Resolve `name` as a value of type `F`, typically a function pointer.
    ///
    /// # Safety
    ///
    /// `F` must match the actual type of the exported symbol, and the returned
    /// value must not be used after `self` is dropped.
    pub unsafe fn symbol<F: Copy>(&self, name: &str) -> Result<F, LoadError> {
        // SAFETY: forwarded to the caller.
        let symbol: Symbol<'_, F> = unsafe { self.library.get(name.as_bytes()) }.map_err(|_| {
            LoadError::MissingSymbols {
                symbols: vec![name.to_owned()],
            }
        })?;
        Ok(*symbol)
    }

    /// Path or name the library was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_reports_every_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let candidates = [
            dir.path().join("libgpuq-missing-a.so"),
            dir.path().join("libgpuq-missing-b.so"),
        ];
        let mut diag = Diagnostics::new();

        let err = DriverLibrary::open(&candidates, &mut diag).unwrap_err();
        assert_eq!(err, LoadError::LibraryNotFound { tried: 2 });

        let entries: Vec<_> = diag.entries().collect();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].contains("libgpuq-missing-a.so"));
        assert!(entries[1].contains("libgpuq-missing-b.so"));
    }

    #[test]
    fn test_open_without_candidates() {
        let mut diag = Diagnostics::new();
        let err = DriverLibrary::open(Vec::<PathBuf>::new(), &mut diag).unwrap_err();
        assert_eq!(err, LoadError::LibraryNotFound { tried: 0 });
        assert!(diag.is_empty());
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn test_require_lists_missing_symbols() {
        let mut diag = Diagnostics::new();
        let library = DriverLibrary::open(["libc.so.6"], &mut diag).unwrap();
        assert_eq!(library.path(), Path::new("libc.so.6"));

        library.require(&["malloc", "free"], &mut diag).unwrap();
        assert!(diag.is_empty());

        let err = library
            .require(&["malloc", "gpuqNoSuchSymbol", "gpuqAlsoMissing"], &mut diag)
            .unwrap_err();
        assert_eq!(
            err,
            LoadError::MissingSymbols {
                symbols: vec!["gpuqNoSuchSymbol".into(), "gpuqAlsoMissing".into()]
            }
        );
        assert_eq!(diag.entries().count(), 2);
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn test_symbol_is_callable() {
        type FnAbs = unsafe extern "C" fn(std::ffi::c_int) -> std::ffi::c_int;

        let mut diag = Diagnostics::new();
        let library = DriverLibrary::load(["libc.so.6"], &["abs"], &mut diag).unwrap();
        let abs: FnAbs = unsafe { library.symbol("abs") }.unwrap();
        assert_eq!(unsafe { abs(-7) }, 7);
    }
}
