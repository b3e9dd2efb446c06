//! SIL printer
//!
//! Emits the textual form read back by [`crate::frontend::parse_sil`].
//! Values and blocks are renumbered in layout order, so printing a parsed
//! module reproduces its canonical text.

use std::collections::HashMap;
use std::fmt;

use crate::ast::{AstContext, DeclId, DeclKind};
use crate::middle::ir::*;
use crate::types::{SilType, Type};

/// Render a whole module
pub fn print_module(module: &SilModule) -> String {
    ModulePrinter(module).to_string()
}

/// Render a single function
pub fn print_function(module: &SilModule, func: &Function) -> String {
    FunctionPrinter::new(module, func).to_string()
}

pub struct ModulePrinter<'a>(pub &'a SilModule);

impl fmt::Display for ModulePrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let module = self.0;
        let ast = &module.ast;
        writeln!(f, "sil_stage {}", module.stage)?;

        if !module.imports.is_empty() {
            writeln!(f)?;
            for import in &module.imports {
                writeln!(f, "import {}", import)?;
            }
        }

        for (id, decl) in ast.decls() {
            if decl.module == module.module_id && decl.parent.is_none() && decl.kind.is_nominal_type() {
                writeln!(f)?;
                write_type_decl(f, ast, id)?;
            }
        }

        for (_, global) in module.globals() {
            writeln!(f)?;
            write!(f, "sil_global ")?;
            if global.linkage != SilLinkage::Public {
                write!(f, "{} ", global.linkage)?;
            }
            if global.attrs.contains(GlobalAttributes::LET) {
                write!(f, "[let] ")?;
            }
            if global.attrs.contains(GlobalAttributes::SERIALIZED) {
                write!(f, "[serialized] ")?;
            }
            writeln!(f, "@{} : ${}", global.name, global.ty.display(ast))?;
        }

        for (id, scope) in module.scopes() {
            writeln!(f)?;
            write!(f, "sil_scope {} {{ ", scope_slot(id))?;
            if let Some(loc) = &scope.loc {
                write!(f, "loc {} ", loc)?;
            }
            match scope.parent {
                ScopeParent::Function(func) => write!(f, "parent @{}", module.function(func).name)?,
                ScopeParent::Scope(parent) => write!(f, "parent {}", scope_slot(parent))?,
            }
            if let Some(inlined) = scope.inlined_at {
                write!(f, " inlined_at {}", scope_slot(inlined))?;
            }
            writeln!(f, " }}")?;
        }

        for (_, func) in module.functions() {
            writeln!(f)?;
            write!(f, "{}", FunctionPrinter::new(module, func))?;
        }

        for table in module.witness_tables() {
            writeln!(f)?;
            let conformance = ast.conformance(table.conformance);
            write!(f, "sil_witness_table ")?;
            if table.linkage != SilLinkage::Public {
                write!(f, "{} ", table.linkage)?;
            }
            writeln!(
                f,
                "{}: {} module {} {{",
                conformance.ty.get().display(ast),
                ast.decl(conformance.protocol).name,
                ast.module_name(conformance.module)
            )?;
            let protocol = &ast.decl(conformance.protocol).name;
            for entry in &table.entries {
                write!(f, "  method #{}.{}: ", protocol, entry.requirement)?;
                match entry.function {
                    Some(func) => writeln!(f, "@{}", module.function(func).name)?,
                    None => writeln!(f, "nil")?,
                }
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}

fn scope_slot(id: ScopeId) -> usize {
    id.index() + 1
}

fn write_type_decl(f: &mut fmt::Formatter<'_>, ast: &AstContext, id: DeclId) -> fmt::Result {
    let decl = ast.decl(id);
    writeln!(f, "{} {} {{", decl.kind.keyword(), decl.name)?;
    match &decl.kind {
        DeclKind::Struct { fields } | DeclKind::Class { fields } => {
            for field in fields {
                writeln!(f, "  var {}: {}", field.name, field.ty.display(ast))?;
            }
        }
        DeclKind::Enum { cases } => {
            for case in cases {
                match &case.payload {
                    Some(payload) => writeln!(f, "  case {}({})", case.name, payload.display(ast))?,
                    None => writeln!(f, "  case {}", case.name)?,
                }
            }
        }
        DeclKind::Protocol {
            requirements,
            associated_types,
        } => {
            for assoc in associated_types {
                writeln!(f, "  associatedtype {}", assoc)?;
            }
            for req in requirements {
                writeln!(f, "  func {}", req)?;
            }
        }
        _ => {}
    }
    for member in ast.members(id) {
        let member = ast.decl(member);
        if member.kind.is_function_like() {
            writeln!(f, "  {} {}", member.kind.keyword(), member.name)?;
        }
    }
    writeln!(f, "}}")
}

/// Prints one function with its own value and block numbering.
pub struct FunctionPrinter<'a> {
    module: &'a SilModule,
    func: &'a Function,
    values: HashMap<ValueId, usize>,
    blocks: HashMap<BlockId, usize>,
}

impl<'a> FunctionPrinter<'a> {
    pub fn new(module: &'a SilModule, func: &'a Function) -> Self {
        let mut values = HashMap::new();
        let mut blocks = HashMap::new();
        for (i, block) in func.layout().iter().enumerate() {
            blocks.insert(*block, i);
            for arg in func.block_args(*block) {
                let n = values.len();
                values.insert(*arg, n);
            }
            for inst in func.block_insts(*block) {
                for result in func.results(*inst) {
                    let n = values.len();
                    values.insert(*result, n);
                }
            }
        }
        Self {
            module,
            func,
            values,
            blocks,
        }
    }

    fn ast(&self) -> &AstContext {
        &self.module.ast
    }

    fn value(&self, v: ValueId) -> String {
        match self.values.get(&v) {
            Some(n) => format!("%{}", n),
            None if self.func.is_undef(v) => "undef".to_string(),
            None => "%<invalid>".to_string(),
        }
    }

    fn block(&self, b: BlockId) -> String {
        match self.blocks.get(&b) {
            Some(n) => format!("bb{}", n),
            None => format!("<unlaid {}>", b),
        }
    }

    fn ty(&self, ty: &SilType) -> String {
        format!("${}", ty.display(self.ast()))
    }

    fn typed(&self, v: ValueId) -> String {
        format!("{} : {}", self.value(v), self.ty(self.func.value_type(v)))
    }

    fn typed_list(&self, values: &[ValueId]) -> String {
        values
            .iter()
            .map(|v| self.typed(*v))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn block_with_args(&self, dest: BlockId, args: &[ValueId]) -> String {
        if args.is_empty() {
            self.block(dest)
        } else {
            format!("{}({})", self.block(dest), self.typed_list(args))
        }
    }

    /// `S` for a nominal type, used to qualify members
    fn nominal_name(&self, ty: &SilType) -> String {
        match &ty.ty {
            Type::Nominal(decl) => self.ast().decl(*decl).name.clone(),
            other => other.display(self.ast()).to_string(),
        }
    }

    fn case_ref(&self, enum_ty: &SilType, case: usize) -> String {
        let name = match &enum_ty.ty {
            Type::Nominal(decl) => self
                .ast()
                .decl(*decl)
                .cases()
                .get(case)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| format!("<case {}>", case)),
            _ => format!("<case {}>", case),
        };
        format!("#{}.{}!enumelt", self.nominal_name(enum_ty), name)
    }

    fn field_ref(&self, struct_ty: &SilType, field: usize) -> String {
        let name = match &struct_ty.ty {
            Type::Nominal(decl) => self
                .ast()
                .decl(*decl)
                .fields()
                .get(field)
                .map(|f| f.name.clone())
                .unwrap_or_else(|| format!("<field {}>", field)),
            _ => format!("<field {}>", field),
        };
        format!("#{}.{}", self.nominal_name(struct_ty), name)
    }

    fn member_ref(&self, member: DeclId) -> String {
        let decl = self.ast().decl(member);
        match decl.parent {
            Some(parent) => format!("#{}.{}", self.ast().decl(parent).name, decl.name),
            None => format!("#{}", decl.name),
        }
    }

    fn write_inst(&self, f: &mut fmt::Formatter<'_>, inst: InstId) -> fmt::Result {
        let func = self.func;
        let data = func.inst(inst);
        let ops = data.operands();
        write!(f, "  ")?;
        match data.results() {
            [] => {}
            [r] => write!(f, "{} = ", self.value(*r))?,
            many => {
                let names: Vec<_> = many.iter().map(|r| self.value(*r)).collect();
                write!(f, "({}) = ", names.join(", "))?;
            }
        }
        let result_ty = data.results().first().map(|r| func.value_type(*r));
        let opcode = data.kind.opcode();
        write!(f, "{}", opcode)?;
        match &data.kind {
            InstKind::IntegerLiteral { value } => {
                if let Some(ty) = result_ty {
                    write!(f, " {}, {}", self.ty(ty), value)?;
                }
            }
            InstKind::FloatLiteral { bits } => {
                if let Some(ty) = result_ty {
                    write!(f, " {}, 0x{:X}", self.ty(ty), bits)?;
                }
            }
            InstKind::StringLiteral { encoding, value } => write!(f, " {} {:?}", encoding, value)?,
            InstKind::FunctionRef { function } => {
                let callee = self.module.function(*function);
                write!(
                    f,
                    " @{} : {}",
                    callee.name,
                    self.ty(&SilType::object(Type::Function(Box::new(callee.ty.clone()))))
                )?;
            }
            InstKind::GlobalAddr { global } => {
                let g = self.module.global(*global);
                write!(f, " @{} : {}", g.name, self.ty(&g.ty.address_type()))?;
            }
            InstKind::Tuple => write!(f, " ({})", self.typed_list(ops))?,
            InstKind::TupleExtract { index } => write!(f, " {}, {}", self.typed(ops[0]), index)?,
            InstKind::Struct => {
                if let Some(ty) = result_ty {
                    write!(f, " {} ({})", self.ty(ty), self.typed_list(ops))?;
                }
            }
            InstKind::StructExtract { field } => {
                let ty = func.value_type(ops[0]);
                write!(f, " {}, {}", self.typed(ops[0]), self.field_ref(ty, *field))?;
            }
            InstKind::Enum { case } => {
                if let Some(ty) = result_ty {
                    write!(f, " {}, {}", self.ty(ty), self.case_ref(ty, *case))?;
                    if let Some(payload) = ops.first() {
                        write!(f, ", {}", self.typed(*payload))?;
                    }
                }
            }
            InstKind::UncheckedEnumData { case } => {
                let ty = func.value_type(ops[0]);
                write!(f, " {}, {}", self.typed(ops[0]), self.case_ref(ty, *case))?;
            }
            InstKind::SelectEnum { cases, has_default } => {
                let enum_ty = func.value_type(ops[0]);
                write!(f, " {}", self.typed(ops[0]))?;
                for (i, case) in cases.iter().enumerate() {
                    write!(f, ", case {}: {}", self.case_ref(enum_ty, *case), self.value(ops[1 + i]))?;
                }
                if *has_default {
                    write!(f, ", default {}", self.value(ops[1 + cases.len()]))?;
                }
                if let Some(ty) = result_ty {
                    write!(f, " : {}", self.ty(ty))?;
                }
            }
            InstKind::Builtin { name } => {
                write!(f, " {:?}({})", name, self.typed_list(ops))?;
                if let Some(ty) = result_ty {
                    write!(f, " : {}", self.ty(ty))?;
                }
            }
            InstKind::Apply => {
                let args: Vec<_> = ops[1..].iter().map(|v| self.value(*v)).collect();
                write!(
                    f,
                    " {}({}) : {}",
                    self.value(ops[0]),
                    args.join(", "),
                    self.ty(func.value_type(ops[0]))
                )?;
            }
            InstKind::StrongRetain
            | InstKind::StrongRelease
            | InstKind::CopyValue
            | InstKind::DestroyValue
            | InstKind::DeallocStack
            | InstKind::Return
            | InstKind::Throw => write!(f, " {}", self.typed(ops[0]))?,
            InstKind::AllocStack { dynamic_lifetime } => {
                if *dynamic_lifetime {
                    write!(f, " [dynamic_lifetime]")?;
                }
                if let Some(ty) = result_ty {
                    write!(f, " {}", self.ty(&ty.object_type()))?;
                }
            }
            InstKind::Load { qualifier } => {
                if let Some(q) = qualifier.keyword() {
                    write!(f, " [{}]", q)?;
                }
                write!(f, " {}", self.typed(ops[0]))?;
            }
            InstKind::Store { qualifier } => {
                write!(f, " {} to ", self.value(ops[0]))?;
                if let Some(q) = qualifier.keyword() {
                    write!(f, "[{}] ", q)?;
                }
                write!(f, "{}", self.typed(ops[1]))?;
            }
            InstKind::ClassMethod { member } | InstKind::ObjcMethod { member } => {
                write!(f, " {}, {}", self.typed(ops[0]), self.member_ref(*member))?;
                if opcode == Opcode::ObjcMethod {
                    write!(f, "!foreign")?;
                }
                if let Some(ty) = result_ty {
                    write!(f, " : {}", self.ty(ty))?;
                }
            }
            InstKind::CondFail { message } => {
                write!(f, " {}", self.typed(ops[0]))?;
                if !message.is_empty() {
                    write!(f, ", {:?}", message)?;
                }
            }
            InstKind::Br { dest } => write!(f, " {}", self.block_with_args(*dest, ops))?,
            InstKind::CondBr {
                true_dest,
                false_dest,
                ..
            } => {
                let edges = func.successor_edges(inst);
                write!(
                    f,
                    " {}, {}, {}",
                    self.value(ops[0]),
                    self.block_with_args(*true_dest, &ops[edges[0].args.clone()]),
                    self.block_with_args(*false_dest, &ops[edges[1].args.clone()])
                )?;
            }
            InstKind::SwitchValue { cases, default } => {
                write!(f, " {}", self.typed(ops[0]))?;
                for (value, dest) in cases {
                    write!(f, ", case {}: {}", value, self.block(*dest))?;
                }
                if let Some(dest) = default {
                    write!(f, ", default {}", self.block(*dest))?;
                }
            }
            InstKind::SwitchEnum { cases, default } => {
                let enum_ty = func.value_type(ops[0]);
                write!(f, " {}", self.typed(ops[0]))?;
                for (case, dest) in cases {
                    write!(f, ", case {}: {}", self.case_ref(enum_ty, *case), self.block(*dest))?;
                }
                if let Some(dest) = default {
                    write!(f, ", default {}", self.block(*dest))?;
                }
            }
            InstKind::Unreachable => {}
        }
        if let Some(loc) = &data.loc {
            write!(f, ", loc {}", loc)?;
        }
        if let Some(scope) = data.scope {
            write!(f, ", scope {}", scope_slot(scope))?;
        }
        writeln!(f)
    }
}

impl fmt::Display for FunctionPrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let func = self.func;
        write!(f, "sil ")?;
        if func.linkage != SilLinkage::default_for(func.is_definition()) {
            write!(f, "{} ", func.linkage)?;
        }
        for attr in func.attrs.keywords() {
            write!(f, "[{}] ", attr)?;
        }
        write!(
            f,
            "@{} : {}",
            func.name,
            self.ty(&SilType::object(Type::Function(Box::new(func.ty.clone()))))
        )?;
        if !func.is_definition() {
            return writeln!(f);
        }
        writeln!(f, " {{")?;
        for (i, block) in func.layout().iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", self.block(*block))?;
            let args = func.block_args(*block);
            if !args.is_empty() {
                let rendered: Vec<_> = args
                    .iter()
                    .map(|a| {
                        let ownership = func
                            .ownership(*a)
                            .attribute()
                            .map(|o| format!("{} ", o))
                            .unwrap_or_default();
                        format!("{} : {}{}", self.value(*a), ownership, self.ty(func.value_type(*a)))
                    })
                    .collect();
                write!(f, "({})", rendered.join(", "))?;
            }
            writeln!(f, ":")?;
            for inst in func.block_insts(*block) {
                self.write_inst(f, *inst)?;
            }
        }
        writeln!(f, "}} // end sil function '{}'", func.name)
    }
}
