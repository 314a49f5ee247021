//! The compilation driver.
//!
//! [`Compiler`] runs the whole pipeline for one method:
//!
//! ```text
//! MethodModel ─► SsaBuilder ─► OptimizerPipeline ─► Relooper ─► CompiledMethod
//!                                 (optional)          │
//!                                                     ├─ body from the entry node
//!                                                     └─ one block per reachable handler,
//!                                                        resuming the body where they
//!                                                        meet it
//! ```
//!
//! [`Compiler::compile_class`] applies it to every method of a class, optionally on the
//! rayon thread pool. A failing method does not affect the others unless
//! [`CompilerOptions::fail_fast`] is set.

mod options;

pub use options::CompilerOptions;

use rayon::prelude::*;

use crate::{
    bytecode::Address,
    classfile::{ClassModel, MethodModel},
    linker::LinkerContext,
    optimizer::OptimizerPipeline,
    relooper::{Block, Relooper},
    ssa::{Program, SsaBuilder},
    Result,
};

/// The output for one method.
#[derive(Debug, Clone)]
pub struct CompiledMethod {
    /// Name and descriptor, e.g. `add(II)I`
    pub name: String,
    /// The SSA program the blocks refer to
    pub program: Program,
    /// Structured body; `None` for abstract and native methods
    pub body: Option<Block>,
    /// Structured exception handlers keyed by handler start address
    pub handlers: Vec<(Address, Block)>,
}

impl CompiledMethod {
    /// True if the method has bytecode.
    #[must_use]
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// The value the label variable must hold when the body starts.
    ///
    /// `Some` only when handlers resume the body: the body is then a [`Block::Loop`]
    /// that dispatches on the label right away.
    #[must_use]
    pub fn entry_label(&self) -> Option<Address> {
        let body = self.body.as_ref()?;
        if body.entries().len() < 2 {
            return None;
        }
        let cfg = self.program.cfg();
        cfg.entry().and_then(|entry| cfg.node(entry)).map(|node| node.start)
    }
}

/// The result of one method inside a [`ClassCompilation`].
#[derive(Debug)]
pub struct MethodCompilation {
    /// Name and descriptor of the method
    pub name: String,
    /// The compiled method or the reason it was skipped
    pub result: Result<CompiledMethod>,
}

/// Per-method results for a whole class, in declaration order.
#[derive(Debug)]
pub struct ClassCompilation {
    /// Internal name of the class
    pub class: String,
    /// One entry per method
    pub methods: Vec<MethodCompilation>,
}

impl ClassCompilation {
    /// Methods that compiled.
    pub fn compiled(&self) -> impl Iterator<Item = &CompiledMethod> + '_ {
        self.methods
            .iter()
            .filter_map(|method| method.result.as_ref().ok())
    }

    /// Number of methods that failed.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.methods
            .iter()
            .filter(|method| method.result.is_err())
            .count()
    }
}

/// Compiles methods against a fixed linker and option set.
///
/// The compiler holds no mutable state, so one instance can serve many classes and
/// threads.
///
/// # Example
///
/// ```rust,ignore
/// use classscope::prelude::*;
///
/// let class = ClassModel::from_file("Example.class".as_ref())?;
/// let linker = ClassHierarchy::builder().add_class(&class).build();
/// let compiler = Compiler::new(&linker, CompilerOptions::default());
///
/// let compilation = compiler.compile_class(&class)?;
/// println!("{} of {} methods failed", compilation.failure_count(), compilation.methods.len());
/// ```
pub struct Compiler<'a> {
    linker: &'a dyn LinkerContext,
    options: CompilerOptions,
}

impl<'a> Compiler<'a> {
    /// Creates a compiler.
    #[must_use]
    pub fn new(linker: &'a dyn LinkerContext, options: CompilerOptions) -> Self {
        Compiler { linker, options }
    }

    /// The options in effect.
    #[must_use]
    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Compiles a single method.
    ///
    /// # Errors
    ///
    /// Returns the first error of SSA construction, the optimizer or the relooper. Parse
    /// errors are wrapped in [`crate::Error::InMethod`]; unsupported constructs and
    /// consistency failures carry their own [`crate::MethodContext`].
    pub fn compile_method(&self, class: &ClassModel, method: &MethodModel) -> Result<CompiledMethod> {
        let name = method.qualified_name();
        let mut program = SsaBuilder::new(class, method, self.linker, &self.options).build()?;

        if self.options.optimize {
            let rounds = OptimizerPipeline::standard(self.options.max_optimizer_iterations)
                .run(&mut program)?;
            log::debug!("{}: optimizer changed {} rounds", program.context(), rounds);
        }

        if program.cfg().is_empty() {
            return Ok(CompiledMethod {
                name,
                program,
                body: None,
                handlers: Vec::new(),
            });
        }

        let mut entries: Vec<_> = program
            .cfg()
            .nodes()
            .filter(|(id, node)| node.kind.is_handler() && program.cfg().is_reachable(*id))
            .map(|(id, node)| (node.start, id))
            .collect();
        entries.sort_by_key(|(address, _)| *address);
        let entries: Vec<_> = entries.into_iter().map(|(_, node)| node).collect();

        let (body, handlers) = Relooper::new().reloop_method(&program, &entries)?;

        Ok(CompiledMethod {
            name,
            program,
            body: Some(body),
            handlers,
        })
    }

    /// Compiles every method of `class`.
    ///
    /// Failures are recorded per method and logged at warn level.
    ///
    /// # Errors
    ///
    /// Only with [`CompilerOptions::fail_fast`]: the error of the first failing method in
    /// declaration order.
    pub fn compile_class(&self, class: &ClassModel) -> Result<ClassCompilation> {
        let compile = |method: &MethodModel| MethodCompilation {
            name: method.qualified_name(),
            result: self.compile_method(class, method),
        };

        let methods: Vec<MethodCompilation> = if self.options.parallel {
            class.methods.par_iter().map(compile).collect()
        } else if self.options.fail_fast {
            let mut methods = Vec::with_capacity(class.methods.len());
            for method in &class.methods {
                let compiled = compile(method);
                let failed = compiled.result.is_err();
                methods.push(compiled);
                if failed {
                    break;
                }
            }
            methods
        } else {
            class.methods.iter().map(compile).collect()
        };

        if self.options.fail_fast {
            let mut results = Vec::with_capacity(methods.len());
            for method in methods {
                results.push(MethodCompilation {
                    result: Ok(method.result?),
                    name: method.name,
                });
            }
            return Ok(ClassCompilation {
                class: class.this_class.clone(),
                methods: results,
            });
        }

        for method in &methods {
            if let Err(error) = &method.result {
                log::warn!("{}.{} skipped: {}", class.this_class, method.name, error);
            }
        }
        log::debug!(
            "{}: compiled {} of {} methods",
            class.this_class,
            methods.iter().filter(|method| method.result.is_ok()).count(),
            methods.len()
        );

        Ok(ClassCompilation {
            class: class.this_class.clone(),
            methods,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::{opcodes::*, CodeAssembler},
        classfile::{ClassWriter, CodeAttribute, MethodAccessFlags},
        linker::{ClassHierarchy, PermissiveLinker},
    };

    /// A class with a working `ok()I`, an abstract `shape()V` and a `broken()V` calling
    /// a class the hierarchy does not know.
    fn mixed_class() -> ClassModel {
        let mut writer = ClassWriter::new("demo/Mixed");
        let missing = writer.method_ref("demo/Missing", "work", "()V").unwrap();

        let mut ok = CodeAssembler::new();
        ok.push_int(7).op(IRETURN);
        let mut broken = CodeAssembler::new();
        broken.op_u16(INVOKESTATIC, missing).op(RETURN);

        writer
            .add_method(
                MethodAccessFlags::STATIC,
                "ok",
                "()I",
                Some(CodeAttribute::new(1, 0, ok.finish().unwrap())),
            )
            .add_method(
                MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
                "shape",
                "()V",
                None,
            )
            .add_method(
                MethodAccessFlags::STATIC,
                "broken",
                "()V",
                Some(CodeAttribute::new(0, 0, broken.finish().unwrap())),
            );
        writer.build().unwrap()
    }

    #[test]
    fn test_failures_are_isolated() {
        let class = mixed_class();
        let linker = ClassHierarchy::builder().add_class(&class).build();
        for parallel in [false, true] {
            let options = CompilerOptions {
                parallel,
                ..CompilerOptions::default()
            };
            let compilation = Compiler::new(&linker, options).compile_class(&class).unwrap();

            let names: Vec<&str> = compilation.methods.iter().map(|m| m.name.as_str()).collect();
            assert_eq!(names, vec!["ok()I", "shape()V", "broken()V"]);
            assert_eq!(compilation.failure_count(), 1);
            assert!(compilation.methods[2]
                .result
                .as_ref()
                .unwrap_err()
                .is_unsupported());
            assert_eq!(compilation.compiled().count(), 2);
        }
    }

    #[test]
    fn test_fail_fast_returns_first_error() {
        let class = mixed_class();
        let linker = ClassHierarchy::builder().add_class(&class).build();
        for parallel in [false, true] {
            let options = CompilerOptions {
                parallel,
                fail_fast: true,
                ..CompilerOptions::default()
            };
            let error = Compiler::new(&linker, options)
                .compile_class(&class)
                .unwrap_err();
            assert!(error.is_unsupported());
        }
    }

    #[test]
    fn test_abstract_method_has_no_body() {
        let class = mixed_class();
        let compiled = Compiler::new(&PermissiveLinker, CompilerOptions::default())
            .compile_method(&class, &class.methods[1])
            .unwrap();
        assert!(!compiled.has_body());
        assert!(compiled.handlers.is_empty());
    }

    #[test]
    fn test_handlers_are_relooped_separately() {
        let mut writer = ClassWriter::new("demo/Guarded");
        let callee = writer.method_ref("demo/Guarded", "work", "()V").unwrap();
        let mut asm = CodeAssembler::new();
        asm.op_u16(INVOKESTATIC, callee).op(RETURN);
        asm.label("handler").unwrap().local(ASTORE, 0).op(RETURN);
        let code = CodeAttribute::new(1, 1, asm.finish().unwrap()).with_handler(
            0,
            3,
            4,
            Some("java/lang/RuntimeException"),
        );
        writer.add_method(MethodAccessFlags::STATIC, "run", "()V", Some(code));
        let class = writer.build().unwrap();

        let compiled = Compiler::new(&PermissiveLinker, CompilerOptions::debug())
            .compile_method(&class, &class.methods[0])
            .unwrap();

        assert!(compiled.has_body());
        assert_eq!(compiled.handlers.len(), 1);
        assert_eq!(compiled.handlers[0].0, Address::new(4));
        let body_label = compiled.body.as_ref().unwrap().label();
        assert_ne!(body_label, compiled.handlers[0].1.label());
    }
}
