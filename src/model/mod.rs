//! Program model consumed by the analysis engine
//!
//! The engine never parses source code. A front end (or a JSON dump produced
//! by one) supplies the target class as plain data: executables with their
//! statement trees, fields with their default initializers, and a static type
//! on every expression. The null type is distinguishable from reference types
//! so that `x = null` can be told apart from `x = y`.

pub mod build;
pub mod visit;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Statement identifier, unique within one executable
///
/// Identifiers are assigned by the class registry in pre-order when the class
/// is registered, so adapters may leave them at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StmtId(pub u32);

impl fmt::Display for StmtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Static type of an expression, field, parameter or return value
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeRef {
    Void,
    /// Type of the `null` literal
    Null,
    #[default]
    Unknown,
    Primitive(String),
    Reference(String),
    Array(Box<TypeRef>),
}

impl TypeRef {
    pub fn void() -> Self {
        TypeRef::Void
    }

    pub fn object(name: &str) -> Self {
        TypeRef::Reference(name.to_string())
    }

    pub fn primitive(name: &str) -> Self {
        TypeRef::Primitive(name.to_string())
    }

    pub fn int() -> Self {
        TypeRef::primitive("int")
    }

    pub fn boolean() -> Self {
        TypeRef::primitive("boolean")
    }

    pub fn string() -> Self {
        TypeRef::object("java.lang.String")
    }

    /// Primitive and void values can never hold null
    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeRef::Primitive(_) | TypeRef::Void)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, TypeRef::Null)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, TypeRef::Reference(name) if name == "java.lang.String" || name == "String")
    }

    /// Rendering used inside signatures
    pub fn name(&self) -> String {
        match self {
            TypeRef::Void => "void".to_string(),
            TypeRef::Null => "<nulltype>".to_string(),
            TypeRef::Unknown => "?".to_string(),
            TypeRef::Primitive(name) | TypeRef::Reference(name) => name.clone(),
            TypeRef::Array(elem) => format!("{}[]", elem.name()),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Declared visibility of an executable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Protected,
    Private,
    Package,
}

impl Visibility {
    /// Whether a test generator can call the executable from outside
    pub fn is_target_visible(&self) -> bool {
        matches!(self, Visibility::Public | Visibility::Protected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutableKind {
    Method,
    Constructor,
}

/// The single class under analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassModel {
    /// Qualified class name
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    #[serde(default)]
    pub executables: Vec<ExecutableDecl>,
}

impl ClassModel {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid class model JSON")
    }

    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn constructors(&self) -> impl Iterator<Item = &ExecutableDecl> {
        self.executables.iter().filter(|e| e.is_constructor())
    }

    pub fn methods(&self) -> impl Iterator<Item = &ExecutableDecl> {
        self.executables.iter().filter(|e| !e.is_constructor())
    }
}

/// Load a class model from a JSON file
pub fn load_class_model(path: &Path) -> Result<ClassModel> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read class model {}", path.display()))?;
    ClassModel::from_json_str(&text).with_context(|| format!("in {}", path.display()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeRef,
    #[serde(default)]
    pub initializer: Option<Expr>,
    #[serde(default)]
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
}

/// Method or constructor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutableDecl {
    pub kind: ExecutableKind,
    pub name: String,
    /// Explicit signature; derived from name and parameter types when absent
    #[serde(default)]
    pub signature: Option<String>,
    pub visibility: Visibility,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default = "TypeRef::void")]
    pub return_type: TypeRef,
    /// `None` for abstract and native executables
    #[serde(default)]
    pub body: Option<Block>,
}

impl ExecutableDecl {
    pub fn is_constructor(&self) -> bool {
        self.kind == ExecutableKind::Constructor
    }

    /// Signature key qualified by the declaring class
    ///
    /// Methods render as `pkg.Cls.name(T1,T2)`, constructors as `pkg.Cls(T1,T2)`.
    pub fn qualified_signature(&self, class: &str) -> String {
        if let Some(sig) = &self.signature {
            return sig.clone();
        }
        let params = self
            .params
            .iter()
            .map(|p| p.ty.name())
            .collect::<Vec<_>>()
            .join(",");
        match self.kind {
            ExecutableKind::Constructor => format!("{}({})", class, params),
            ExecutableKind::Method => format!("{}.{}({})", class, self.name, params),
        }
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// Ordered statement list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self { stmts }
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    /// Assign statement ids in pre-order, starting at 1
    ///
    /// Returns the number of statements numbered.
    pub fn number_statements(&mut self) -> u32 {
        let mut next = 0;
        number_stmts(&mut self.stmts, &mut next);
        next
    }
}

fn number_stmts(stmts: &mut [Stmt], next: &mut u32) {
    for stmt in stmts {
        *next += 1;
        stmt.id = StmtId(*next);
        match &mut stmt.kind {
            StmtKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                number_stmts(&mut then_branch.stmts, next);
                if let Some(e) = else_branch {
                    number_stmts(&mut e.stmts, next);
                }
            }
            StmtKind::While { body, .. }
            | StmtKind::DoWhile { body, .. }
            | StmtKind::ForEach { body, .. }
            | StmtKind::Block { body } => number_stmts(&mut body.stmts, next),
            StmtKind::For {
                init, update, body, ..
            } => {
                number_stmts(init, next);
                number_stmts(&mut body.stmts, next);
                number_stmts(update, next);
            }
            StmtKind::Switch { cases, .. } => {
                for case in cases {
                    number_stmts(&mut case.body.stmts, next);
                }
            }
            StmtKind::Try {
                body,
                catches,
                finally,
            } => {
                number_stmts(&mut body.stmts, next);
                for c in catches {
                    number_stmts(&mut c.body.stmts, next);
                }
                if let Some(f) = finally {
                    number_stmts(&mut f.stmts, next);
                }
            }
            StmtKind::Local { .. }
            | StmtKind::Assign { .. }
            | StmtKind::Expr { .. }
            | StmtKind::Return { .. }
            | StmtKind::Throw { .. }
            | StmtKind::Break
            | StmtKind::Continue => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    #[serde(default)]
    pub id: StmtId,
    #[serde(default)]
    pub line: u32,
    #[serde(flatten)]
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StmtKind {
    Local {
        name: String,
        ty: TypeRef,
        #[serde(default)]
        init: Option<Expr>,
    },
    Assign {
        target: Expr,
        value: Expr,
    },
    Expr {
        expr: Expr,
    },
    If {
        cond: Expr,
        then_branch: Block,
        #[serde(default)]
        else_branch: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    DoWhile {
        body: Block,
        cond: Expr,
    },
    For {
        #[serde(default)]
        init: Vec<Stmt>,
        #[serde(default)]
        cond: Option<Expr>,
        #[serde(default)]
        update: Vec<Stmt>,
        body: Block,
    },
    ForEach {
        var: String,
        ty: TypeRef,
        iterable: Expr,
        body: Block,
    },
    Switch {
        selector: Expr,
        cases: Vec<SwitchCase>,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
    },
    Throw {
        value: Expr,
    },
    Break,
    Continue,
    Block {
        body: Block,
    },
    Try {
        body: Block,
        #[serde(default)]
        catches: Vec<CatchClause>,
        #[serde(default)]
        finally: Option<Block>,
    },
}

impl StmtKind {
    /// Statements that become a single CFG node
    pub fn is_simple(&self) -> bool {
        matches!(
            self,
            StmtKind::Local { .. }
                | StmtKind::Assign { .. }
                | StmtKind::Expr { .. }
                | StmtKind::Return { .. }
                | StmtKind::Throw { .. }
                | StmtKind::Break
                | StmtKind::Continue
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// Empty for the `default` label
    #[serde(default)]
    pub labels: Vec<Expr>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchClause {
    pub param: String,
    pub ty: TypeRef,
    pub body: Block,
}

/// Expression with its static type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    #[serde(default)]
    pub ty: TypeRef,
    #[serde(flatten)]
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExprKind {
    Literal {
        value: Literal,
    },
    Local {
        name: String,
    },
    Param {
        name: String,
    },
    /// Field read; a missing receiver means an implicit `this` or a static
    /// field of the target class
    Field {
        #[serde(default)]
        receiver: Option<Box<Expr>>,
        name: String,
    },
    This,
    /// Static receiver such as `Math` in `Math.max(a, b)`
    TypeAccess {
        name: String,
    },
    ArrayAccess {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    Invoke {
        #[serde(default)]
        receiver: Option<Box<Expr>>,
        /// Callee signature as rendered at the call site, possibly partial
        method: String,
        #[serde(default)]
        args: Vec<Expr>,
        /// Declaring type of the callee when the front end knows it
        #[serde(default)]
        owner: Option<String>,
    },
    New {
        class: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    NewArray {
        #[serde(default)]
        dims: Vec<Expr>,
        #[serde(default)]
        elements: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Cast {
        operand: Box<Expr>,
    },
    InstanceOf {
        operand: Box<Expr>,
        class: String,
    },
    /// Assignment used as an expression, e.g. `(line = r.readLine()) != null`
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// Lambda or method reference; its body is not analyzed
    Lambda,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Str(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("null"),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(x) => write!(f, "{}", x),
            Literal::Char(c) => write!(f, "'{}'", c),
            Literal::Str(s) => write!(f, "{:?}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    BitNot,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

impl UnaryOp {
    /// Increment and decrement write their operand
    pub fn writes_operand(&self) -> bool {
        matches!(
            self,
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_equality(&self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::Ne)
    }

    /// Short-circuit operators add a decision point
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

/// Identity of a tracked variable
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum VarId {
    /// Field of the target class, read through `this` or implicitly
    Field(String),
    Param(String),
    Local(String),
}

impl VarId {
    pub fn name(&self) -> &str {
        match self {
            VarId::Field(n) | VarId::Param(n) | VarId::Local(n) => n,
        }
    }

    pub fn is_field(&self) -> bool {
        matches!(self, VarId::Field(_))
    }

    pub fn is_param(&self) -> bool {
        matches!(self, VarId::Param(_))
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarId::Field(n) => write!(f, "this.{}", n),
            VarId::Param(n) => write!(f, "param {}", n),
            VarId::Local(n) => f.write_str(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::build::*;

    #[test]
    fn test_qualified_signature_method_and_constructor() {
        let m = method("get", Visibility::Public)
            .param("key", TypeRef::string())
            .returns(TypeRef::object("Foo"))
            .build();
        assert_eq!(m.qualified_signature("pkg.Cls"), "pkg.Cls.get(java.lang.String)");

        let c = constructor(Visibility::Public).param("n", TypeRef::int()).build();
        assert_eq!(c.qualified_signature("pkg.Cls"), "pkg.Cls(int)");
    }

    #[test]
    fn test_explicit_signature_wins() {
        let mut m = method("run", Visibility::Private).build();
        m.signature = Some("custom.run()".to_string());
        assert_eq!(m.qualified_signature("pkg.Cls"), "custom.run()");
    }

    #[test]
    fn test_type_ref_predicates() {
        assert!(TypeRef::int().is_primitive());
        assert!(TypeRef::Void.is_primitive());
        assert!(!TypeRef::string().is_primitive());
        assert!(TypeRef::Null.is_null());
        assert!(TypeRef::string().is_string());
        assert_eq!(TypeRef::Array(Box::new(TypeRef::int())).name(), "int[]");
    }

    #[test]
    fn test_class_model_from_json() {
        let json = r#"{
            "name": "demo.Box",
            "fields": [{"name": "x", "ty": {"reference": "java.lang.Object"}}],
            "executables": [{
                "kind": "method",
                "name": "m",
                "visibility": "public",
                "body": [
                    {"line": 3, "kind": "expr", "expr": {
                        "ty": "void",
                        "kind": "invoke",
                        "receiver": {"ty": {"reference": "java.lang.Object"}, "kind": "field", "name": "x"},
                        "method": "foo()"
                    }}
                ]
            }]
        }"#;
        let model = ClassModel::from_json_str(json).unwrap();
        assert_eq!(model.name, "demo.Box");
        assert_eq!(model.fields.len(), 1);
        let m = &model.executables[0];
        assert_eq!(m.return_type, TypeRef::Void);
        let body = m.body.as_ref().unwrap();
        assert_eq!(body.stmts[0].line, 3);
        assert!(matches!(body.stmts[0].kind, StmtKind::Expr { .. }));
    }

    #[test]
    fn test_class_model_invalid_json() {
        assert!(ClassModel::from_json_str("{\"fields\": []}").is_err());
    }
}
