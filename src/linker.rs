//! Read-only linking queries.
//!
//! While lifting a method the SSA builder asks whether the classes, methods and fields it
//! references exist, and how to type a PHI that merges two different reference types.
//! These questions are answered by a [`LinkerContext`]. The context is shared by every
//! method compiled in parallel, so implementations must be [`Sync`] and are never
//! mutated during compilation.
//!
//! Two implementations are provided:
//!
//! - [`ClassHierarchy`] - built from parsed [`ClassModel`]s and frozen by
//!   [`ClassHierarchyBuilder::build`]
//! - [`PermissiveLinker`] - resolves everything; useful for single-class tools and tests
//!
//! # Example
//!
//! ```rust,ignore
//! use classscope::linker::{ClassHierarchy, LinkerContext};
//!
//! let hierarchy = ClassHierarchy::builder()
//!     .add_opaque("java/lang/Object")
//!     .add_class(&class)
//!     .build();
//! assert!(hierarchy.is_resolvable(&class.this_class));
//! ```

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    classfile::{ClassModel, FieldType, MethodSignature},
    ssa::TypeRef,
};

const JAVA_LANG_OBJECT: &str = "java/lang/Object";

/// Linking queries answered while building SSA.
pub trait LinkerContext: Sync {
    /// True if `class` (an internal name) can be loaded.
    fn is_resolvable(&self, class: &str) -> bool;

    /// True if `class` or one of its supertypes declares a static method `name` with
    /// `signature`.
    fn resolve_static_method(&self, class: &str, name: &str, signature: &MethodSignature)
        -> bool;

    /// True if an instance method `name` with `signature` is visible through `class`.
    fn resolve_virtual_method(
        &self,
        class: &str,
        name: &str,
        signature: &MethodSignature,
    ) -> bool;

    /// True if `invokespecial` of `name` on `class` finds a non-static method.
    fn resolve_private_method(
        &self,
        class: &str,
        name: &str,
        signature: &MethodSignature,
    ) -> bool;

    /// True if `class` declares a constructor with `signature`.
    fn resolve_constructor(&self, class: &str, signature: &MethodSignature) -> bool;

    /// The type of a PHI merging values of type `a` and `b`.
    ///
    /// The default promotes numeric types, keeps the known side when one reference
    /// type is unknown and falls back to `java/lang/Object` for differing references.
    fn widest_common_type(&self, a: &TypeRef, b: &TypeRef) -> TypeRef {
        if let Some(promoted) = TypeRef::promote(a, b) {
            return promoted;
        }
        match (a, b) {
            (TypeRef::Reference(None), other) | (other, TypeRef::Reference(None)) => {
                other.clone()
            }
            _ => TypeRef::java_object(),
        }
    }
}

/// A [`LinkerContext`] that resolves every query.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveLinker;

impl LinkerContext for PermissiveLinker {
    fn is_resolvable(&self, _class: &str) -> bool {
        true
    }

    fn resolve_static_method(&self, _: &str, _: &str, _: &MethodSignature) -> bool {
        true
    }

    fn resolve_virtual_method(&self, _: &str, _: &str, _: &MethodSignature) -> bool {
        true
    }

    fn resolve_private_method(&self, _: &str, _: &str, _: &MethodSignature) -> bool {
        true
    }

    fn resolve_constructor(&self, _: &str, _: &MethodSignature) -> bool {
        true
    }
}

#[derive(Debug, Clone, Default)]
struct ClassEntry {
    super_class: Option<String>,
    interfaces: Vec<String>,
    /// `name + descriptor` -> is static
    methods: FxHashMap<String, bool>,
    /// Members are not known; every member query succeeds
    opaque: bool,
}

/// A frozen class hierarchy built from parsed classes.
///
/// Classes added with [`ClassHierarchyBuilder::add_opaque`] are known to exist, but their
/// members are not; every member lookup that reaches such a class succeeds. This is how
/// platform classes that were not parsed are made available.
#[derive(Debug, Clone, Default)]
pub struct ClassHierarchy {
    classes: FxHashMap<String, ClassEntry>,
}

/// Collects classes for a [`ClassHierarchy`].
#[derive(Debug, Default)]
pub struct ClassHierarchyBuilder {
    classes: FxHashMap<String, ClassEntry>,
}

impl ClassHierarchyBuilder {
    /// Registers a parsed class with all its methods.
    #[must_use]
    pub fn add_class(mut self, class: &ClassModel) -> Self {
        let methods = class
            .methods
            .iter()
            .map(|method| (method.qualified_name(), method.is_static()))
            .collect();
        self.classes.insert(
            class.this_class.clone(),
            ClassEntry {
                super_class: class.super_class.clone(),
                interfaces: class.interfaces.clone(),
                methods,
                opaque: false,
            },
        );
        self
    }

    /// Registers several parsed classes.
    #[must_use]
    pub fn add_classes<'a>(self, classes: impl IntoIterator<Item = &'a ClassModel>) -> Self {
        classes.into_iter().fold(self, Self::add_class)
    }

    /// Registers a class whose members are not known.
    #[must_use]
    pub fn add_opaque(mut self, class: &str) -> Self {
        let super_class = (class != JAVA_LANG_OBJECT).then(|| JAVA_LANG_OBJECT.to_string());
        self.classes
            .entry(class.to_string())
            .or_insert_with(|| ClassEntry {
                super_class,
                opaque: true,
                ..ClassEntry::default()
            });
        self
    }

    /// Freezes the hierarchy.
    #[must_use]
    pub fn build(self) -> ClassHierarchy {
        log::debug!("class hierarchy frozen with {} classes", self.classes.len());
        ClassHierarchy {
            classes: self.classes,
        }
    }
}

impl ClassHierarchy {
    /// Starts an empty builder.
    #[must_use]
    pub fn builder() -> ClassHierarchyBuilder {
        ClassHierarchyBuilder::default()
    }

    /// Number of known classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// True if no class is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// The superclass chain of `class`, starting with `class` itself.
    ///
    /// Stops at the first class that is not known or at a cycle.
    #[must_use]
    pub fn superclasses(&self, class: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = Some(class.to_string());
        while let Some(name) = current {
            if chain.contains(&name) {
                break;
            }
            current = self
                .classes
                .get(&name)
                .and_then(|entry| entry.super_class.clone());
            chain.push(name);
        }
        chain
    }

    /// True if `class` is `ancestor` or inherits from it.
    #[must_use]
    pub fn is_subclass_of(&self, class: &str, ancestor: &str) -> bool {
        self.supertypes(class).iter().any(|name| name == ancestor)
    }

    /// `class` followed by all its superclasses and superinterfaces, breadth first.
    fn supertypes(&self, class: &str) -> Vec<String> {
        let mut seen = FxHashSet::default();
        let mut order = Vec::new();
        let mut queue = std::collections::VecDeque::from([class.to_string()]);
        while let Some(name) = queue.pop_front() {
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(entry) = self.classes.get(&name) {
                queue.extend(entry.super_class.iter().cloned());
                queue.extend(entry.interfaces.iter().cloned());
            }
            order.push(name);
        }
        order
    }

    /// Looks for `name + descriptor` in the supertypes of `class`.
    ///
    /// `want_static` filters by the static flag. Reaching an opaque class counts as a
    /// match.
    fn find_method(
        &self,
        class: &str,
        name: &str,
        signature: &MethodSignature,
        want_static: bool,
        include_interfaces: bool,
    ) -> bool {
        let key = format!("{name}{signature}");
        let candidates = if include_interfaces {
            self.supertypes(class)
        } else {
            self.superclasses(class)
        };
        candidates.iter().any(|candidate| {
            self.classes.get(candidate).is_some_and(|entry| {
                entry.opaque
                    || entry
                        .methods
                        .get(&key)
                        .is_some_and(|&is_static| is_static == want_static)
            })
        })
    }
}

impl LinkerContext for ClassHierarchy {
    fn is_resolvable(&self, class: &str) -> bool {
        if class.starts_with('[') {
            return match FieldType::parse(class) {
                Ok(array) => array
                    .referenced_class()
                    .is_none_or(|element| self.classes.contains_key(element)),
                Err(_) => false,
            };
        }
        self.classes.contains_key(class)
    }

    fn resolve_static_method(
        &self,
        class: &str,
        name: &str,
        signature: &MethodSignature,
    ) -> bool {
        self.find_method(class, name, signature, true, true)
    }

    fn resolve_virtual_method(
        &self,
        class: &str,
        name: &str,
        signature: &MethodSignature,
    ) -> bool {
        // Array types inherit every method of java/lang/Object
        let owner = if class.starts_with('[') {
            JAVA_LANG_OBJECT
        } else {
            class
        };
        self.find_method(owner, name, signature, false, true)
    }

    fn resolve_private_method(
        &self,
        class: &str,
        name: &str,
        signature: &MethodSignature,
    ) -> bool {
        self.find_method(class, name, signature, false, true)
    }

    fn resolve_constructor(&self, class: &str, signature: &MethodSignature) -> bool {
        let key = format!("<init>{signature}");
        self.classes
            .get(class)
            .is_some_and(|entry| entry.opaque || entry.methods.contains_key(&key))
    }

    fn widest_common_type(&self, a: &TypeRef, b: &TypeRef) -> TypeRef {
        if let Some(promoted) = TypeRef::promote(a, b) {
            return promoted;
        }
        match (a, b) {
            (TypeRef::Reference(None), other) | (other, TypeRef::Reference(None)) => {
                other.clone()
            }
            (
                TypeRef::Reference(Some(FieldType::Object(left))),
                TypeRef::Reference(Some(FieldType::Object(right))),
            ) => {
                let left_chain = self.superclasses(left);
                self.superclasses(right)
                    .into_iter()
                    .find(|candidate| left_chain.contains(candidate))
                    .map_or_else(TypeRef::java_object, |common| TypeRef::object(&common))
            }
            _ => TypeRef::java_object(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{ClassWriter, MethodAccessFlags};

    fn hierarchy() -> ClassHierarchy {
        let mut base = ClassWriter::new("demo/Base");
        base.add_method(MethodAccessFlags::PUBLIC, "<init>", "()V", None);
        base.add_method(MethodAccessFlags::PUBLIC, "run", "(I)V", None);
        base.add_method(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            "make",
            "()Ldemo/Base;",
            None,
        );
        let base = base.build().unwrap();

        let mut left = ClassWriter::new("demo/Left").with_super(Some("demo/Base"));
        left.add_method(MethodAccessFlags::PRIVATE, "secret", "()I", None);
        let left = left.build().unwrap();
        let right = ClassWriter::new("demo/Right")
            .with_super(Some("demo/Base"))
            .build()
            .unwrap();

        ClassHierarchy::builder()
            .add_opaque("java/lang/Object")
            .add_classes([&base, &left, &right])
            .build()
    }

    #[test]
    fn test_method_resolution_walks_superclasses() {
        let h = hierarchy();
        let sig = MethodSignature::parse("(I)V").unwrap();
        assert!(h.resolve_virtual_method("demo/Left", "run", &sig));
        assert!(!h.resolve_static_method("demo/Left", "run", &sig));

        let make = MethodSignature::parse("()Ldemo/Base;").unwrap();
        assert!(h.resolve_static_method("demo/Right", "make", &make));

        let secret = MethodSignature::parse("()I").unwrap();
        assert!(h.resolve_private_method("demo/Left", "secret", &secret));
        assert!(!h.resolve_private_method("demo/Right", "secret", &secret));
    }

    #[test]
    fn test_constructors_are_not_inherited() {
        let h = hierarchy();
        let sig = MethodSignature::parse("()V").unwrap();
        assert!(h.resolve_constructor("demo/Base", &sig));
        assert!(!h.resolve_constructor("demo/Left", &sig));
        // opaque classes accept any member
        assert!(h.resolve_constructor("java/lang/Object", &sig));
    }

    #[test]
    fn test_resolvable_classes_and_arrays() {
        let h = hierarchy();
        assert!(h.is_resolvable("demo/Left"));
        assert!(!h.is_resolvable("demo/Missing"));
        assert!(h.is_resolvable("[[Ldemo/Left;"));
        assert!(h.is_resolvable("[I"));
        assert!(!h.is_resolvable("[Ldemo/Missing;"));
    }

    #[test]
    fn test_widest_common_type() {
        let h = hierarchy();
        assert_eq!(
            h.widest_common_type(&TypeRef::object("demo/Left"), &TypeRef::object("demo/Right")),
            TypeRef::object("demo/Base")
        );
        assert_eq!(
            h.widest_common_type(&TypeRef::Reference(None), &TypeRef::object("demo/Left")),
            TypeRef::object("demo/Left")
        );
        assert_eq!(
            PermissiveLinker.widest_common_type(&TypeRef::Short, &TypeRef::Int),
            TypeRef::Int
        );
    }
}
