//! Benchmarks for the compilation pipeline.
//!
//! A synthetic class with a mix of straight-line, branching and looping methods is
//! serialized once and then:
//! - parsed from bytes
//! - compiled sequentially
//! - compiled in parallel

use classscope::{
    bytecode::{opcodes::*, CodeAssembler},
    classfile::{ClassWriter, CodeAttribute, MethodAccessFlags},
    linker::ClassHierarchy,
    ClassModel, Compiler, CompilerOptions,
};
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;

const METHODS: usize = 64;

fn arithmetic() -> CodeAssembler {
    let mut asm = CodeAssembler::new();
    asm.local(ILOAD, 0)
        .local(ILOAD, 0)
        .op(IMUL)
        .push_int(7)
        .op(IADD)
        .local(ISTORE, 1)
        .local(ILOAD, 1)
        .push_int(3)
        .op(ISHL)
        .op(IRETURN);
    asm
}

fn branching() -> CodeAssembler {
    let mut asm = CodeAssembler::new();
    asm.local(ILOAD, 0).branch(IFLT, "negative");
    asm.local(ILOAD, 0).push_int(2).op(IREM).branch(IFEQ, "even");
    asm.push_int(1).local(ISTORE, 1).branch(GOTO, "join");
    asm.label("even").unwrap().push_int(2).local(ISTORE, 1).branch(GOTO, "join");
    asm.label("negative").unwrap().push_int(-1).local(ISTORE, 1);
    asm.label("join").unwrap().local(ILOAD, 1).op(IRETURN);
    asm
}

fn looping() -> CodeAssembler {
    let mut asm = CodeAssembler::new();
    asm.op(ICONST_0).local(ISTORE, 1).op(ICONST_0).local(ISTORE, 2);
    asm.label("head")
        .unwrap()
        .local(ILOAD, 2)
        .local(ILOAD, 0)
        .branch(IF_ICMPGE, "done");
    asm.local(ILOAD, 1)
        .local(ILOAD, 2)
        .op(IADD)
        .local(ISTORE, 1)
        .iinc(2, 1)
        .branch(GOTO, "head");
    asm.label("done").unwrap().local(ILOAD, 1).op(IRETURN);
    asm
}

fn synthetic_class() -> Vec<u8> {
    let mut writer = ClassWriter::new("bench/Synthetic");
    for index in 0..METHODS {
        let asm = match index % 3 {
            0 => arithmetic(),
            1 => branching(),
            _ => looping(),
        };
        writer.add_method(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            &format!("m{index}"),
            "(I)I",
            Some(CodeAttribute::new(4, 3, asm.finish().unwrap())),
        );
    }
    writer.to_bytes().unwrap()
}

fn bench_parse(c: &mut Criterion) {
    let bytes = synthetic_class();
    let mut group = c.benchmark_group("classfile");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("from_bytes", |b| {
        b.iter(|| ClassModel::from_bytes(black_box(&bytes)).unwrap());
    });
    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let class = ClassModel::from_bytes(&synthetic_class()).unwrap();
    let linker = ClassHierarchy::builder().add_class(&class).build();

    let mut group = c.benchmark_group("compile_class");
    group.throughput(Throughput::Elements(METHODS as u64));
    for (name, parallel) in [("sequential", false), ("parallel", true)] {
        let options = CompilerOptions {
            parallel,
            ..CompilerOptions::default()
        };
        let compiler = Compiler::new(&linker, options);
        group.bench_function(name, |b| {
            b.iter(|| compiler.compile_class(black_box(&class)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse, bench_compile);
criterion_main!(benches);
