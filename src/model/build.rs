//! Construction helpers for program models
//!
//! Front ends that do not go through JSON, and the test suites, build models
//! with these functions instead of spelling out every struct literal.

use super::*;

pub struct ClassBuilder {
    model: ClassModel,
}

/// Start a class model with a qualified name
pub fn class(name: &str) -> ClassBuilder {
    ClassBuilder {
        model: ClassModel {
            name: name.to_string(),
            fields: Vec::new(),
            executables: Vec::new(),
        },
    }
}

impl ClassBuilder {
    pub fn field(mut self, name: &str, ty: TypeRef) -> Self {
        self.model.fields.push(FieldDecl {
            name: name.to_string(),
            ty,
            initializer: None,
            is_static: false,
        });
        self
    }

    pub fn field_init(mut self, name: &str, ty: TypeRef, init: Expr) -> Self {
        self.model.fields.push(FieldDecl {
            name: name.to_string(),
            ty,
            initializer: Some(init),
            is_static: false,
        });
        self
    }

    pub fn executable(mut self, exec: ExecutableDecl) -> Self {
        self.model.executables.push(exec);
        self
    }

    pub fn build(self) -> ClassModel {
        self.model
    }
}

pub struct ExecutableBuilder {
    decl: ExecutableDecl,
}

pub fn method(name: &str, visibility: Visibility) -> ExecutableBuilder {
    ExecutableBuilder {
        decl: ExecutableDecl {
            kind: ExecutableKind::Method,
            name: name.to_string(),
            signature: None,
            visibility,
            params: Vec::new(),
            return_type: TypeRef::Void,
            body: Some(Block::default()),
        },
    }
}

pub fn constructor(visibility: Visibility) -> ExecutableBuilder {
    ExecutableBuilder {
        decl: ExecutableDecl {
            kind: ExecutableKind::Constructor,
            name: "<init>".to_string(),
            signature: None,
            visibility,
            params: Vec::new(),
            return_type: TypeRef::Void,
            body: Some(Block::default()),
        },
    }
}

impl ExecutableBuilder {
    pub fn param(mut self, name: &str, ty: TypeRef) -> Self {
        self.decl.params.push(Param {
            name: name.to_string(),
            ty,
        });
        self
    }

    pub fn returns(mut self, ty: TypeRef) -> Self {
        self.decl.return_type = ty;
        self
    }

    pub fn body(mut self, stmts: Vec<Stmt>) -> Self {
        self.decl.body = Some(Block::new(stmts));
        self
    }

    /// Abstract or native: no body to analyze
    pub fn without_body(mut self) -> Self {
        self.decl.body = None;
        self
    }

    pub fn build(self) -> ExecutableDecl {
        self.decl
    }
}

fn expr(ty: TypeRef, kind: ExprKind) -> Expr {
    Expr { ty, kind }
}

// Expressions

pub fn null() -> Expr {
    expr(TypeRef::Null, ExprKind::Literal { value: Literal::Null })
}

pub fn int_lit(value: i64) -> Expr {
    expr(TypeRef::int(), ExprKind::Literal { value: Literal::Int(value) })
}

pub fn bool_lit(value: bool) -> Expr {
    expr(TypeRef::boolean(), ExprKind::Literal { value: Literal::Bool(value) })
}

pub fn str_lit(value: &str) -> Expr {
    expr(
        TypeRef::string(),
        ExprKind::Literal {
            value: Literal::Str(value.to_string()),
        },
    )
}

pub fn local_ref(name: &str, ty: TypeRef) -> Expr {
    expr(ty, ExprKind::Local { name: name.to_string() })
}

pub fn param_ref(name: &str, ty: TypeRef) -> Expr {
    expr(ty, ExprKind::Param { name: name.to_string() })
}

/// Field of the target class accessed without a receiver
pub fn field_ref(name: &str, ty: TypeRef) -> Expr {
    expr(
        ty,
        ExprKind::Field {
            receiver: None,
            name: name.to_string(),
        },
    )
}

/// Field accessed through an explicit receiver (`this.x`, `other.x`)
pub fn field_of(receiver: Expr, name: &str, ty: TypeRef) -> Expr {
    expr(
        ty,
        ExprKind::Field {
            receiver: Some(Box::new(receiver)),
            name: name.to_string(),
        },
    )
}

pub fn this_ref(class: &str) -> Expr {
    expr(TypeRef::object(class), ExprKind::This)
}

pub fn type_access(name: &str) -> Expr {
    expr(TypeRef::object(name), ExprKind::TypeAccess { name: name.to_string() })
}

pub fn call(receiver: Option<Expr>, method: &str, args: Vec<Expr>, ret: TypeRef) -> Expr {
    expr(
        ret,
        ExprKind::Invoke {
            receiver: receiver.map(Box::new),
            method: method.to_string(),
            args,
            owner: None,
        },
    )
}

/// Call with an explicit receiver and no arguments
pub fn call_on(receiver: Expr, method: &str, ret: TypeRef) -> Expr {
    call(Some(receiver), method, Vec::new(), ret)
}

/// Call on an implicit `this` (or a static method of the target class)
pub fn call_self(method: &str, args: Vec<Expr>, ret: TypeRef) -> Expr {
    call(None, method, args, ret)
}

pub fn with_owner(mut call: Expr, owner: &str) -> Expr {
    if let ExprKind::Invoke { owner: o, .. } = &mut call.kind {
        *o = Some(owner.to_string());
    }
    call
}

pub fn new_object(class: &str, args: Vec<Expr>) -> Expr {
    expr(
        TypeRef::object(class),
        ExprKind::New {
            class: class.to_string(),
            args,
        },
    )
}

pub fn new_array(elem: TypeRef, dims: Vec<Expr>) -> Expr {
    expr(
        TypeRef::Array(Box::new(elem)),
        ExprKind::NewArray {
            dims,
            elements: Vec::new(),
        },
    )
}

pub fn array_access(array: Expr, index: Expr, ty: TypeRef) -> Expr {
    expr(
        ty,
        ExprKind::ArrayAccess {
            array: Box::new(array),
            index: Box::new(index),
        },
    )
}

pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, ty: TypeRef) -> Expr {
    expr(
        ty,
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
    )
}

pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Eq, lhs, rhs, TypeRef::boolean())
}

pub fn ne(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Ne, lhs, rhs, TypeRef::boolean())
}

pub fn unary(op: UnaryOp, operand: Expr, ty: TypeRef) -> Expr {
    expr(
        ty,
        ExprKind::Unary {
            op,
            operand: Box::new(operand),
        },
    )
}

pub fn conditional(cond: Expr, then_expr: Expr, else_expr: Expr, ty: TypeRef) -> Expr {
    expr(
        ty,
        ExprKind::Conditional {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        },
    )
}

pub fn cast(operand: Expr, ty: TypeRef) -> Expr {
    expr(
        ty,
        ExprKind::Cast {
            operand: Box::new(operand),
        },
    )
}

pub fn assign_expr(target: Expr, value: Expr) -> Expr {
    let ty = target.ty.clone();
    expr(
        ty,
        ExprKind::Assign {
            target: Box::new(target),
            value: Box::new(value),
        },
    )
}

// Statements

fn stmt(line: u32, kind: StmtKind) -> Stmt {
    Stmt {
        id: StmtId::default(),
        line,
        kind,
    }
}

pub fn local_decl(line: u32, name: &str, ty: TypeRef, init: Option<Expr>) -> Stmt {
    stmt(
        line,
        StmtKind::Local {
            name: name.to_string(),
            ty,
            init,
        },
    )
}

pub fn assign(line: u32, target: Expr, value: Expr) -> Stmt {
    stmt(line, StmtKind::Assign { target, value })
}

pub fn expr_stmt(line: u32, expr: Expr) -> Stmt {
    stmt(line, StmtKind::Expr { expr })
}

pub fn if_stmt(line: u32, cond: Expr, then_branch: Vec<Stmt>, else_branch: Option<Vec<Stmt>>) -> Stmt {
    stmt(
        line,
        StmtKind::If {
            cond,
            then_branch: Block::new(then_branch),
            else_branch: else_branch.map(Block::new),
        },
    )
}

pub fn while_stmt(line: u32, cond: Expr, body: Vec<Stmt>) -> Stmt {
    stmt(
        line,
        StmtKind::While {
            cond,
            body: Block::new(body),
        },
    )
}

pub fn do_while(line: u32, body: Vec<Stmt>, cond: Expr) -> Stmt {
    stmt(
        line,
        StmtKind::DoWhile {
            body: Block::new(body),
            cond,
        },
    )
}

pub fn for_stmt(
    line: u32,
    init: Vec<Stmt>,
    cond: Option<Expr>,
    update: Vec<Stmt>,
    body: Vec<Stmt>,
) -> Stmt {
    stmt(
        line,
        StmtKind::For {
            init,
            cond,
            update,
            body: Block::new(body),
        },
    )
}

pub fn for_each(line: u32, var: &str, ty: TypeRef, iterable: Expr, body: Vec<Stmt>) -> Stmt {
    stmt(
        line,
        StmtKind::ForEach {
            var: var.to_string(),
            ty,
            iterable,
            body: Block::new(body),
        },
    )
}

/// Each case is its label list (empty for `default`) and its body
pub fn switch_stmt(line: u32, selector: Expr, cases: Vec<(Vec<Expr>, Vec<Stmt>)>) -> Stmt {
    stmt(
        line,
        StmtKind::Switch {
            selector,
            cases: cases
                .into_iter()
                .map(|(labels, body)| SwitchCase {
                    labels,
                    body: Block::new(body),
                })
                .collect(),
        },
    )
}

pub fn ret(line: u32, value: Option<Expr>) -> Stmt {
    stmt(line, StmtKind::Return { value })
}

pub fn throw(line: u32, value: Expr) -> Stmt {
    stmt(line, StmtKind::Throw { value })
}

pub fn brk(line: u32) -> Stmt {
    stmt(line, StmtKind::Break)
}

pub fn cont(line: u32) -> Stmt {
    stmt(line, StmtKind::Continue)
}

pub fn block(line: u32, body: Vec<Stmt>) -> Stmt {
    stmt(line, StmtKind::Block { body: Block::new(body) })
}

pub fn try_stmt(
    line: u32,
    body: Vec<Stmt>,
    catches: Vec<CatchClause>,
    finally: Option<Vec<Stmt>>,
) -> Stmt {
    stmt(
        line,
        StmtKind::Try {
            body: Block::new(body),
            catches,
            finally: finally.map(Block::new),
        },
    )
}

pub fn catch(param: &str, ty: TypeRef, body: Vec<Stmt>) -> CatchClause {
    CatchClause {
        param: param.to_string(),
        ty,
        body: Block::new(body),
    }
}
