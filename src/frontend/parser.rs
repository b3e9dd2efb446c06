//! SIL parser
//!
//! Recursive-descent parser producing a [`SilModule`]. Every top-level
//! construct is parsed on its own: an error aborts that construct, the
//! parser skips to the next line that starts a top-level keyword, and the
//! whole module is discarded at the end if anything was reported.
//!
//! Forward references are resolved per function. A branch to a block that
//! is not defined yet creates the block detached from the layout; a use of
//! a value that is not defined yet creates a placeholder that is patched
//! when the definition arrives. Anything still unresolved when the closing
//! brace is reached is diagnosed once per name.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use log::{debug, trace};

use crate::ast::{Decl, DeclId, DeclKind, EnumCaseDecl, FieldDecl};
use crate::frontend::lexer::Lexer;
use crate::frontend::token::{Token, TokenKind};
use crate::middle::ir::*;
use crate::types::{
    BuiltinType, CanType, FunctionRepresentation, FunctionType, OwnershipKind, ParameterConvention,
    ResultConvention, SilParameter, SilType, Type,
};
use crate::utils::{Diagnostic, Error, Result, SourceMap, Span};

const TOP_LEVEL_KEYWORDS: &[&str] = &[
    "sil",
    "sil_stage",
    "sil_global",
    "sil_scope",
    "sil_witness_table",
    "import",
    "struct",
    "enum",
    "class",
    "protocol",
];

/// Parse SIL text into a module named `main`
pub fn parse_sil(source: &str) -> std::result::Result<SilModule, Vec<Diagnostic>> {
    parse_sil_module(source, "main")
}

/// Parse SIL text. On failure every diagnostic is returned and no module is
/// produced.
pub fn parse_sil_module(
    source: &str,
    module_name: &str,
) -> std::result::Result<SilModule, Vec<Diagnostic>> {
    let map = SourceMap::new(source);
    let tokens = Lexer::new(source)
        .tokenize()
        .map_err(|e| vec![Diagnostic::new(e, &map)])?;
    let mut parser = Parser::new(tokens, module_name);
    parser.parse_module();
    parser
        .finish()
        .map_err(|errors| errors.into_iter().map(|e| Diagnostic::new(e, &map)).collect())
}

struct PendingScope {
    loc: Option<SourceLoc>,
    parent: PendingParent,
    inlined_at: Option<ScopeId>,
}

enum PendingParent {
    Function(String, Span),
    Scope(ScopeId),
}

/// Per-function parse state, discarded when the function is done
struct FunctionState {
    func: Function,
    values: HashMap<String, ValueId>,
    forward_values: HashMap<String, (ValueId, Span)>,
    blocks: HashMap<String, BlockId>,
    block_names: HashMap<BlockId, String>,
    forward_blocks: HashMap<String, Span>,
}

impl FunctionState {
    fn new(func: Function) -> Self {
        Self {
            func,
            values: HashMap::new(),
            forward_values: HashMap::new(),
            blocks: HashMap::new(),
            block_names: HashMap::new(),
            forward_blocks: HashMap::new(),
        }
    }

    /// Block named at a use site, created detached if not seen before
    fn use_block(&mut self, name: &str, span: Span) -> BlockId {
        if let Some(b) = self.blocks.get(name) {
            return *b;
        }
        let b = self.func.new_block();
        trace!("forward reference to block {}", name);
        self.blocks.insert(name.to_string(), b);
        self.block_names.insert(b, name.to_string());
        self.forward_blocks.insert(name.to_string(), span);
        b
    }

    fn define_block(&mut self, name: &str, span: Span) -> Result<BlockId> {
        let block = match self.blocks.get(name) {
            Some(b) if self.forward_blocks.remove(name).is_some() => *b,
            Some(_) => {
                return Err(Error::Redefinition {
                    name: name.to_string(),
                    span,
                })
            }
            None => {
                let b = self.func.new_block();
                self.blocks.insert(name.to_string(), b);
                self.block_names.insert(b, name.to_string());
                b
            }
        };
        self.func.layout_block(block);
        Ok(block)
    }

    fn define_value(&mut self, name: String, value: ValueId, span: Span, parser: &Parser) -> Result<()> {
        if self.values.contains_key(&name) {
            return Err(Error::Redefinition {
                name: format!("%{}", name),
                span,
            });
        }
        if let Some((placeholder, _)) = self.forward_values.remove(&name) {
            let expected = self.func.value_type(placeholder);
            let got = self.func.value_type(value);
            if expected != got {
                return Err(parser.type_mismatch(expected, got, span));
            }
            trace!("resolved forward reference %{}", name);
            self.func.resolve_placeholder(placeholder, value);
        }
        self.values.insert(name, value);
        Ok(())
    }
}

/// Recursive-descent SIL parser
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    module: SilModule,
    errors: Vec<Error>,
    defined_types: HashSet<DeclId>,
    scope_slots: HashMap<u32, ScopeId>,
    pending_scopes: Vec<PendingScope>,
    forward_functions: HashMap<String, Span>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, module_name: &str) -> Self {
        Self {
            tokens,
            pos: 0,
            module: SilModule::new(module_name),
            errors: Vec::new(),
            defined_types: HashSet::new(),
            scope_slots: HashMap::new(),
            pending_scopes: Vec::new(),
            forward_functions: HashMap::new(),
        }
    }

    // ==================== Token Helpers ====================

    fn current(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn peek_kind(&self, n: usize) -> &TokenKind {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + n).min(last)].kind
    }

    fn span(&self) -> Span {
        self.current().span
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        self.current().kind == TokenKind::Eof
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn check_ident(&self, text: &str) -> bool {
        self.current().is_ident(text)
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str) -> Error {
        Error::UnexpectedToken {
            expected: expected.to_string(),
            got: self.current().kind.to_string(),
            span: self.span(),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Span> {
        if self.check(&kind) {
            Ok(self.advance().span)
        } else {
            Err(self.unexpected(&kind.to_string()))
        }
    }

    fn expect_keyword(&mut self, text: &str) -> Result<Span> {
        if self.check_ident(text) {
            Ok(self.advance().span)
        } else {
            Err(self.unexpected(&format!("'{}'", text)))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<(String, Span)> {
        match &self.current().kind {
            TokenKind::Ident(s) => {
                let s = s.clone();
                Ok((s, self.advance().span))
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn expect_at_name(&mut self) -> Result<(String, Span)> {
        match &self.current().kind {
            TokenKind::AtName(s) => {
                let s = s.clone();
                Ok((s, self.advance().span))
            }
            _ => Err(self.unexpected("'@' name")),
        }
    }

    fn expect_integer(&mut self) -> Result<(i128, Span)> {
        match self.current().kind {
            TokenKind::Integer(n) => Ok((n, self.advance().span)),
            _ => Err(self.unexpected("integer")),
        }
    }

    fn expect_u32(&mut self) -> Result<(u32, Span)> {
        let (n, span) = self.expect_integer()?;
        let value = u32::try_from(n).map_err(|_| Error::InvalidLiteral {
            text: n.to_string(),
            span,
        })?;
        Ok((value, span))
    }

    fn expect_string(&mut self) -> Result<(String, Span)> {
        match &self.current().kind {
            TokenKind::StringLit(s) => {
                let s = s.clone();
                Ok((s, self.advance().span))
            }
            _ => Err(self.unexpected("string literal")),
        }
    }

    fn type_mismatch(&self, expected: &SilType, got: &SilType, span: Span) -> Error {
        Error::TypeMismatch {
            expected: format!("${}", expected.display(&self.module.ast)),
            got: format!("${}", got.display(&self.module.ast)),
            span,
        }
    }

    fn type_name(&self, ty: &SilType) -> String {
        format!("${}", ty.display(&self.module.ast))
    }

    // ==================== Module ====================

    fn parse_module(&mut self) {
        self.predeclare_types();
        while !self.at_eof() {
            if let Err(e) = self.parse_top_level() {
                debug!("parse error: {}", e);
                self.errors.push(e);
                self.recover();
            }
        }
    }

    /// Skip to the next unindented top-level keyword
    fn recover(&mut self) {
        self.advance();
        while !self.at_eof() {
            let token = self.current();
            if token.at_line_start && token.ident().is_some_and(|s| TOP_LEVEL_KEYWORDS.contains(&s)) {
                return;
            }
            self.advance();
        }
    }

    /// Register every nominal type up front so declarations and signatures
    /// can name types declared further down.
    fn predeclare_types(&mut self) {
        let module_id = self.module.module_id;
        for window in self.tokens.windows(3) {
            let [kw, name, brace] = window else { continue };
            if !kw.at_line_start || brace.kind != TokenKind::LBrace {
                continue;
            }
            let (Some(kw), Some(name)) = (kw.ident(), name.ident()) else {
                continue;
            };
            let kind = match kw {
                "struct" => DeclKind::Struct { fields: vec![] },
                "enum" => DeclKind::Enum { cases: vec![] },
                "class" => DeclKind::Class { fields: vec![] },
                "protocol" => DeclKind::Protocol {
                    requirements: vec![],
                    associated_types: vec![],
                },
                _ => continue,
            };
            if self.module.ast.lookup(module_id, name).is_none() {
                self.module.ast.add_decl(Decl::new(name, module_id, kind));
            }
        }
    }

    fn parse_top_level(&mut self) -> Result<()> {
        let (keyword, span) = self.expect_ident("top-level declaration")?;
        match keyword.as_str() {
            "sil_stage" => {
                let (stage, span) = self.expect_ident("sil stage")?;
                self.module.stage = SilStage::from_str(&stage)
                    .map_err(|_| Error::Expected("'raw', 'canonical' or 'lowered'".into(), span))?;
                Ok(())
            }
            "import" => {
                let (name, _) = self.expect_ident("module name")?;
                self.module.imports.push(name);
                Ok(())
            }
            "struct" | "enum" | "class" | "protocol" => self.parse_type_decl(&keyword),
            "sil_global" => self.parse_global(),
            "sil_scope" => self.parse_scope(),
            "sil_witness_table" => self.parse_witness_table(),
            "sil" => self.parse_function(span),
            _ => Err(Error::Expected("top-level declaration".into(), span)),
        }
    }

    fn finish(mut self) -> std::result::Result<SilModule, Vec<Error>> {
        for pending in std::mem::take(&mut self.pending_scopes) {
            let parent = match pending.parent {
                PendingParent::Scope(s) => ScopeParent::Scope(s),
                PendingParent::Function(name, span) => match self.module.find_function(&name) {
                    Some(f) => ScopeParent::Function(f),
                    None => {
                        self.errors.push(Error::UndefinedFunction { name, span });
                        continue;
                    }
                },
            };
            self.module.add_scope(DebugScope {
                loc: pending.loc,
                parent,
                inlined_at: pending.inlined_at,
            });
        }

        let mut forward: Vec<_> = self.forward_functions.drain().collect();
        forward.sort_by_key(|(_, span)| span.start);
        for (name, span) in forward {
            self.errors.push(Error::UndefinedFunction { name, span });
        }

        if self.errors.is_empty() {
            Ok(self.module)
        } else {
            Err(self.errors)
        }
    }

    // ==================== Types ====================

    /// `$` type
    fn parse_sil_type(&mut self) -> Result<SilType> {
        self.expect(TokenKind::Dollar)?;
        let is_address = self.consume(&TokenKind::Star);
        let ty = self.parse_formal_type()?;
        Ok(SilType { ty, is_address })
    }

    fn parse_formal_type(&mut self) -> Result<Type> {
        match self.current().kind.clone() {
            TokenKind::AtName(name) if name == "convention" => {
                self.advance();
                Ok(Type::Function(Box::new(self.parse_function_type()?)))
            }
            TokenKind::LParen => {
                self.advance();
                let mut elements = Vec::new();
                if !self.check(&TokenKind::RParen) {
                    loop {
                        elements.push(self.parse_formal_type()?);
                        if !self.consume(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RParen)?;
                Ok(Type::Tuple(elements))
            }
            TokenKind::Ident(name) if name == "Builtin" => {
                self.advance();
                self.expect(TokenKind::Dot)?;
                let (builtin, span) = self.expect_ident("builtin type")?;
                BuiltinType::from_name(&builtin)
                    .map(Type::Builtin)
                    .ok_or(Error::UnknownType {
                        name: format!("Builtin.{}", builtin),
                        span,
                    })
            }
            TokenKind::Ident(name) => {
                let span = self.advance().span;
                let decl = self
                    .module
                    .ast
                    .lookup(self.module.module_id, &name)
                    .or_else(|| self.module.ast.lookup_any(&name))
                    .filter(|d| self.module.ast.decl(*d).kind.is_nominal_type());
                decl.map(Type::Nominal)
                    .ok_or(Error::UnknownType { name, span })
            }
            _ => Err(self.unexpected("type")),
        }
    }

    /// After `@convention`: `(repr) (params) -> result`
    fn parse_function_type(&mut self) -> Result<FunctionType> {
        self.expect(TokenKind::LParen)?;
        let (repr, span) = self.expect_ident("function representation")?;
        let representation = FunctionRepresentation::from_str(&repr)
            .map_err(|_| Error::UnknownAttribute { name: repr, span })?;
        self.expect(TokenKind::RParen)?;

        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let convention = match self.current().kind.clone() {
                    TokenKind::AtName(attr) => {
                        let span = self.advance().span;
                        match attr.as_str() {
                            "owned" => ParameterConvention::DirectOwned,
                            "guaranteed" => ParameterConvention::DirectGuaranteed,
                            "inout" => ParameterConvention::IndirectInout,
                            _ => return Err(Error::UnknownAttribute { name: attr, span }),
                        }
                    }
                    _ => ParameterConvention::DirectUnowned,
                };
                let ty = self.parse_formal_type()?;
                params.push(SilParameter { ty, convention });
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Arrow)?;

        let result_convention = match &self.current().kind {
            TokenKind::AtName(attr) if attr == "owned" => {
                self.advance();
                ResultConvention::Owned
            }
            _ => ResultConvention::Unowned,
        };
        let result = self.parse_formal_type()?;
        Ok(FunctionType {
            representation,
            params,
            result,
            result_convention,
        })
    }

    // ==================== Declarations ====================

    fn parse_type_decl(&mut self, keyword: &str) -> Result<()> {
        let (name, span) = self.expect_ident("type name")?;
        let module_id = self.module.module_id;
        let decl = match self.module.ast.lookup(module_id, &name) {
            Some(d) if !self.defined_types.contains(&d) => d,
            _ => return Err(Error::Redefinition { name, span }),
        };
        self.defined_types.insert(decl);
        self.expect(TokenKind::LBrace)?;

        let mut fields = Vec::new();
        let mut cases = Vec::new();
        let mut requirements = Vec::new();
        let mut associated_types = Vec::new();
        let mut methods = Vec::new();
        while !self.consume(&TokenKind::RBrace) {
            let (member, span) = self.expect_ident("member declaration")?;
            match (keyword, member.as_str()) {
                ("struct" | "class", "var") => {
                    let (field, _) = self.expect_ident("field name")?;
                    self.expect(TokenKind::Colon)?;
                    let ty = self.parse_formal_type()?;
                    fields.push(FieldDecl { name: field, ty });
                }
                ("enum", "case") => {
                    let (case, _) = self.expect_ident("case name")?;
                    let payload = if self.consume(&TokenKind::LParen) {
                        let ty = self.parse_formal_type()?;
                        self.expect(TokenKind::RParen)?;
                        Some(ty)
                    } else {
                        None
                    };
                    cases.push(EnumCaseDecl { name: case, payload });
                }
                ("protocol", "func") => requirements.push(self.expect_ident("requirement name")?.0),
                ("protocol", "associatedtype") => {
                    associated_types.push(self.expect_ident("associated type name")?.0)
                }
                (_, "func") => methods.push(self.expect_ident("method name")?.0),
                _ => return Err(Error::Expected(format!("member of {} '{}'", keyword, name), span)),
            }
        }

        self.module.ast.decl_mut(decl).kind = match keyword {
            "struct" => DeclKind::Struct { fields },
            "class" => DeclKind::Class { fields },
            "enum" => DeclKind::Enum { cases },
            _ => DeclKind::Protocol {
                requirements,
                associated_types,
            },
        };
        for method in methods {
            self.module.ast.add_decl(
                Decl::new(method, module_id, DeclKind::Func { signature: None }).with_parent(decl),
            );
        }
        Ok(())
    }

    fn parse_optional_linkage(&mut self) -> Option<SilLinkage> {
        let linkage = self.current().ident().and_then(|s| SilLinkage::from_str(s).ok())?;
        self.advance();
        Some(linkage)
    }

    fn parse_global(&mut self) -> Result<()> {
        let linkage = self.parse_optional_linkage().unwrap_or(SilLinkage::Public);
        let mut attrs = GlobalAttributes::empty();
        while self.consume(&TokenKind::LBracket) {
            let (attr, span) = self.expect_ident("global attribute")?;
            attrs |= match attr.as_str() {
                "let" => GlobalAttributes::LET,
                "serialized" => GlobalAttributes::SERIALIZED,
                _ => return Err(Error::UnknownAttribute { name: attr, span }),
            };
            self.expect(TokenKind::RBracket)?;
        }
        let (name, span) = self.expect_at_name()?;
        self.expect(TokenKind::Colon)?;
        let ty_span = self.span();
        let ty = self.parse_sil_type()?;
        if ty.is_address {
            return Err(Error::Expected("object type for global".into(), ty_span));
        }
        if self.module.find_global(&name).is_some() {
            return Err(Error::Redefinition { name, span });
        }
        self.module.add_global(SilGlobal {
            name,
            ty,
            linkage,
            attrs,
            decl: None,
        });
        Ok(())
    }

    fn parse_source_loc(&mut self) -> Result<SourceLoc> {
        let (file, _) = self.expect_string()?;
        self.expect(TokenKind::Colon)?;
        let (line, _) = self.expect_u32()?;
        self.expect(TokenKind::Colon)?;
        let (column, _) = self.expect_u32()?;
        Ok(SourceLoc { file, line, column })
    }

    fn scope_for_slot(&self, slot: u32, span: Span) -> Result<ScopeId> {
        self.scope_slots
            .get(&slot)
            .copied()
            .ok_or(Error::UndefinedScope { slot, span })
    }

    /// `sil_scope N { loc "f":L:C parent @f|M inlined_at K }`
    fn parse_scope(&mut self) -> Result<()> {
        let (slot, slot_span) = self.expect_u32()?;
        if self.scope_slots.contains_key(&slot) {
            return Err(Error::Redefinition {
                name: format!("sil_scope {}", slot),
                span: slot_span,
            });
        }
        self.expect(TokenKind::LBrace)?;
        let loc = if self.check_ident("loc") {
            self.advance();
            Some(self.parse_source_loc()?)
        } else {
            None
        };
        self.expect_keyword("parent")?;
        let parent = match self.current().kind.clone() {
            TokenKind::AtName(name) => PendingParent::Function(name, self.advance().span),
            _ => {
                let (parent, span) = self.expect_u32()?;
                PendingParent::Scope(self.scope_for_slot(parent, span)?)
            }
        };
        let inlined_at = if self.check_ident("inlined_at") {
            self.advance();
            let (at, span) = self.expect_u32()?;
            Some(self.scope_for_slot(at, span)?)
        } else {
            None
        };
        self.expect(TokenKind::RBrace)?;

        let id = ScopeId(self.pending_scopes.len() as u32);
        self.pending_scopes.push(PendingScope {
            loc,
            parent,
            inlined_at,
        });
        self.scope_slots.insert(slot, id);
        Ok(())
    }

    /// `sil_witness_table [linkage] Type: Proto module M { method #P.req: @f }`
    fn parse_witness_table(&mut self) -> Result<()> {
        let linkage = self.parse_optional_linkage().unwrap_or(SilLinkage::Public);
        let ty = self.parse_formal_type()?;
        self.expect(TokenKind::Colon)?;
        let (proto_name, proto_span) = self.expect_ident("protocol name")?;
        let protocol = self
            .module
            .ast
            .lookup_any(&proto_name)
            .filter(|d| matches!(self.module.ast.decl(*d).kind, DeclKind::Protocol { .. }))
            .ok_or(Error::UnknownType {
                name: proto_name.clone(),
                span: proto_span,
            })?;
        self.expect_keyword("module")?;
        let (module_name, _) = self.expect_ident("module name")?;
        let conforming_module = self.module.ast.add_module(&module_name);
        let conformance = self
            .module
            .ast
            .add_conformance(CanType::new(ty), protocol, conforming_module);

        self.expect(TokenKind::LBrace)?;
        let mut entries = Vec::new();
        while !self.consume(&TokenKind::RBrace) {
            self.expect_keyword("method")?;
            self.expect(TokenKind::Hash)?;
            let (owner, owner_span) = self.expect_ident("protocol name")?;
            if owner != proto_name {
                return Err(Error::Expected(format!("requirement of '{}'", proto_name), owner_span));
            }
            self.expect(TokenKind::Dot)?;
            let (requirement, req_span) = self.expect_ident("requirement name")?;
            let known = match &self.module.ast.decl(protocol).kind {
                DeclKind::Protocol { requirements, .. } => requirements.contains(&requirement),
                _ => false,
            };
            if !known {
                return Err(Error::UnknownField {
                    ty: proto_name,
                    field: requirement,
                    span: req_span,
                });
            }
            self.expect(TokenKind::Colon)?;
            let function = if self.check_ident("nil") {
                self.advance();
                None
            } else {
                let (name, span) = self.expect_at_name()?;
                Some(
                    self.module
                        .find_function(&name)
                        .ok_or(Error::UndefinedFunction { name, span })?,
                )
            };
            entries.push(WitnessEntry {
                requirement,
                function,
            });
        }
        self.module.add_witness_table(WitnessTable {
            linkage,
            conformance,
            entries,
        });
        Ok(())
    }

    // ==================== Functions ====================

    fn parse_function(&mut self, start: Span) -> Result<()> {
        let linkage = self.parse_optional_linkage();
        let mut attrs = FunctionAttributes::empty();
        while self.consume(&TokenKind::LBracket) {
            let (attr, span) = self.expect_ident("function attribute")?;
            attrs |= FunctionAttributes::from_keyword(&attr)
                .ok_or(Error::UnknownAttribute { name: attr, span })?;
            self.expect(TokenKind::RBracket)?;
        }
        let (name, name_span) = self.expect_at_name()?;
        self.expect(TokenKind::Colon)?;
        let ty_span = self.span();
        let ty = self.parse_sil_type()?;
        let fn_ty = match ty.ty {
            Type::Function(f) if !ty.is_address => *f,
            _ => return Err(Error::Expected("function type".into(), ty_span)),
        };

        let id = match self.module.find_function(&name) {
            Some(id) if self.module.is_placed(id) => {
                return Err(Error::Redefinition {
                    name: format!("@{}", name),
                    span: name_span,
                })
            }
            Some(id) => {
                let declared = SilType::object(Type::Function(Box::new(fn_ty.clone())));
                let referenced =
                    SilType::object(Type::Function(Box::new(self.module.function(id).ty.clone())));
                if declared != referenced {
                    return Err(self.type_mismatch(&referenced, &declared, ty_span));
                }
                id
            }
            None => self
                .module
                .add_unplaced_function(Function::new(name.clone(), fn_ty.clone())),
        };
        self.forward_functions.remove(&name);

        let mut func = Function::new(name.clone(), fn_ty);
        func.attrs = attrs;
        let is_definition = self.check(&TokenKind::LBrace);
        func.linkage = linkage.unwrap_or(SilLinkage::default_for(is_definition));
        if is_definition {
            debug!("parsing function @{}", name);
            func = self.parse_function_body(func, start)?;
        }
        self.module.replace_function(id, func);
        self.module.place_function(id);
        Ok(())
    }

    fn parse_function_body(&mut self, func: Function, start: Span) -> Result<Function> {
        self.expect(TokenKind::LBrace)?;
        let mut st = FunctionState::new(func);
        while !self.check(&TokenKind::RBrace) {
            if self.at_eof() {
                return Err(self.unexpected("'}'"));
            }
            self.parse_block(&mut st)?;
        }
        let close = self.expect(TokenKind::RBrace)?;
        if st.func.layout().is_empty() {
            return Err(Error::Expected("basic block".into(), close));
        }

        let mut unresolved = false;
        let mut blocks: Vec<_> = st.forward_blocks.drain().collect();
        blocks.sort_by_key(|(_, span)| span.start);
        for (name, span) in blocks {
            self.errors.push(Error::UndefinedBlock { name, span });
            unresolved = true;
        }
        let mut values: Vec<_> = st.forward_values.drain().collect();
        values.sort_by_key(|(_, (_, span))| span.start);
        for (name, (_, span)) in values {
            self.errors.push(Error::UndefinedValue { name, span });
            unresolved = true;
        }

        if !unresolved {
            let failures = st.func.verify(&self.module.ast);
            for message in failures {
                self.errors.push(Error::Malformed {
                    message: format!("in @{}: {}", st.func.name, message),
                    span: start,
                });
            }
        }
        Ok(st.func)
    }

    fn starts_instruction(&self) -> bool {
        match &self.current().kind {
            TokenKind::LocalName(_) => true,
            TokenKind::Ident(s) => Opcode::from_str(s).is_ok(),
            _ => false,
        }
    }

    fn parse_block(&mut self, st: &mut FunctionState) -> Result<()> {
        let (label, label_span) = self.expect_ident("basic block label")?;
        let block = st.define_block(&label, label_span)?;

        if self.consume(&TokenKind::LParen) {
            loop {
                let (name, span) = match self.current().kind.clone() {
                    TokenKind::LocalName(n) => (n, self.advance().span),
                    _ => return Err(self.unexpected("argument name")),
                };
                self.expect(TokenKind::Colon)?;
                let ownership = self.parse_ownership_annotation(&st.func)?;
                let ty = self.parse_sil_type()?;
                let arg = st.func.add_block_arg(block, ty, ownership);
                st.define_value(name, arg, span, self)?;
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
        }
        self.expect(TokenKind::Colon)?;
        if st.func.is_entry(block) {
            self.check_entry_args(&st.func, label_span)?;
        }

        while self.starts_instruction() {
            self.parse_instruction(st, block, &label)?;
        }
        if st.func.terminator(block).is_none() {
            return Err(Error::MissingTerminator {
                block: label,
                span: label_span,
            });
        }
        Ok(())
    }

    fn parse_ownership_annotation(&mut self, func: &Function) -> Result<OwnershipKind> {
        let TokenKind::AtName(attr) = self.current().kind.clone() else {
            return Ok(OwnershipKind::None);
        };
        let span = self.advance().span;
        let kind = match attr.as_str() {
            "owned" => OwnershipKind::Owned,
            "guaranteed" => OwnershipKind::Guaranteed,
            "unowned" => OwnershipKind::Unowned,
            _ => return Err(Error::UnknownAttribute { name: attr, span }),
        };
        if !func.is_ossa() {
            return Err(Error::Malformed {
                message: format!("ownership annotation '@{}' requires [ossa]", attr),
                span,
            });
        }
        Ok(kind)
    }

    /// Entry arguments must match the signature, including the ownership
    /// implied by each parameter convention.
    fn check_entry_args(&self, func: &Function, span: Span) -> Result<()> {
        let entry = func.entry();
        let args = func.block_args(entry);
        if args.len() != func.ty.params.len() {
            return Err(Error::ArgCountMismatch {
                expected: func.ty.params.len(),
                got: args.len(),
                span,
            });
        }
        for (i, arg) in args.iter().enumerate() {
            let expected = func.ty.argument_type(i);
            let got = func.value_type(*arg);
            if &expected != got {
                return Err(self.type_mismatch(&expected, got, span));
            }
            if func.is_ossa() {
                let expected = func.ty.argument_ownership(i, &self.module.ast);
                let got = func.ownership(*arg);
                if expected != got {
                    return Err(Error::OwnershipMismatch {
                        expected: expected.to_string(),
                        got: got.to_string(),
                        span,
                    });
                }
            }
        }
        Ok(())
    }

    // ==================== Instructions ====================

    fn parse_instruction(&mut self, st: &mut FunctionState, block: BlockId, label: &str) -> Result<()> {
        let result_name = match self.current().kind.clone() {
            TokenKind::LocalName(n) => {
                let span = self.advance().span;
                self.expect(TokenKind::Equal)?;
                Some((n, span))
            }
            _ => None,
        };
        let (op_text, op_span) = self.expect_ident("instruction")?;
        let opcode = Opcode::from_str(&op_text).map_err(|_| Error::UnknownOpcode {
            name: op_text.clone(),
            span: op_span,
        })?;
        if st.func.terminator(block).is_some() {
            return Err(Error::Malformed {
                message: format!("instruction follows the terminator of {}", label),
                span: op_span,
            });
        }

        let inst = self.parse_opcode(st, opcode)?;
        let (loc, scope) = self.parse_debug_location()?;
        st.func.set_debug_location(inst, loc, scope);
        st.func.append_inst(block, inst);

        let results = st.func.results(inst).to_vec();
        match (result_name, results.as_slice()) {
            (Some((name, span)), [result]) => st.define_value(name, *result, span, self),
            (None, []) => Ok(()),
            (Some((_, span)), _) => Err(Error::Malformed {
                message: format!("'{}' does not produce a result", opcode),
                span,
            }),
            (None, _) => Err(Error::Malformed {
                message: format!("result of '{}' must be named", opcode),
                span: op_span,
            }),
        }
    }

    /// `, loc "file":line:col` and `, scope N`
    fn parse_debug_location(&mut self) -> Result<(Option<SourceLoc>, Option<ScopeId>)> {
        let mut loc = None;
        let mut scope = None;
        while self.check(&TokenKind::Comma) {
            match self.peek_kind(1) {
                TokenKind::Ident(s) if s == "loc" && loc.is_none() => {
                    self.advance();
                    self.advance();
                    loc = Some(self.parse_source_loc()?);
                }
                TokenKind::Ident(s) if s == "scope" && scope.is_none() => {
                    self.advance();
                    self.advance();
                    let (slot, span) = self.expect_u32()?;
                    scope = Some(self.scope_for_slot(slot, span)?);
                }
                _ => return Err(self.unexpected_after_comma()),
            }
        }
        Ok((loc, scope))
    }

    fn unexpected_after_comma(&self) -> Error {
        let token = &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)];
        Error::UnexpectedToken {
            expected: "'loc' or 'scope'".into(),
            got: token.kind.to_string(),
            span: token.span,
        }
    }

    /// `%name` or `undef`
    fn parse_value_name(&mut self) -> Result<(Option<String>, Span)> {
        match self.current().kind.clone() {
            TokenKind::LocalName(n) => Ok((Some(n), self.advance().span)),
            TokenKind::Ident(s) if s == "undef" => Ok((None, self.advance().span)),
            _ => Err(self.unexpected("value")),
        }
    }

    fn resolve_value(
        &mut self,
        st: &mut FunctionState,
        name: Option<String>,
        ty: SilType,
        span: Span,
    ) -> Result<ValueId> {
        let Some(name) = name else {
            return Ok(st.func.undef(ty));
        };
        let known = st
            .values
            .get(&name)
            .copied()
            .or_else(|| st.forward_values.get(&name).map(|(v, _)| *v));
        match known {
            Some(v) => {
                let actual = st.func.value_type(v);
                if actual != &ty {
                    return Err(self.type_mismatch(actual, &ty, span));
                }
                Ok(v)
            }
            None => {
                trace!("forward reference to %{}", name);
                let placeholder = st.func.create_placeholder(ty);
                st.forward_values.insert(name, (placeholder, span));
                Ok(placeholder)
            }
        }
    }

    /// `%name : $T`
    fn parse_typed_value(&mut self, st: &mut FunctionState) -> Result<ValueId> {
        let (name, span) = self.parse_value_name()?;
        self.expect(TokenKind::Colon)?;
        let ty = self.parse_sil_type()?;
        self.resolve_value(st, name, ty, span)
    }

    /// `(%a : $A, %b : $B)`
    fn parse_typed_value_list(&mut self, st: &mut FunctionState) -> Result<Vec<ValueId>> {
        self.expect(TokenKind::LParen)?;
        let mut values = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                values.push(self.parse_typed_value(st)?);
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(values)
    }

    /// `bbN` or `bbN(%a : $A, ...)`
    fn parse_branch_dest(&mut self, st: &mut FunctionState) -> Result<(BlockId, Vec<ValueId>)> {
        let (name, span) = self.expect_ident("basic block")?;
        let block = st.use_block(&name, span);
        let args = if self.check(&TokenKind::LParen) {
            self.parse_typed_value_list(st)?
        } else {
            Vec::new()
        };
        Ok((block, args))
    }

    /// `#Type.member` with an optional `!suffix`
    fn parse_member_ref(&mut self) -> Result<(String, String, Option<String>, Span)> {
        let start = self.expect(TokenKind::Hash)?;
        let (owner, _) = self.expect_ident("type name")?;
        self.expect(TokenKind::Dot)?;
        let (member, end) = self.expect_ident("member name")?;
        let suffix = if self.consume(&TokenKind::Bang) {
            Some(self.expect_ident("member suffix")?.0)
        } else {
            None
        };
        Ok((owner, member, suffix, start.merge(&end)))
    }

    /// The nominal declaration behind `ty`, checked against the owner named
    /// in a member reference
    fn member_owner(&self, ty: &SilType, owner: &str, span: Span) -> Result<DeclId> {
        match &ty.ty {
            Type::Nominal(decl) if self.module.ast.decl(*decl).name == owner => Ok(*decl),
            _ => Err(Error::TypeMismatch {
                expected: format!("${}", owner),
                got: self.type_name(ty),
                span,
            }),
        }
    }

    /// `#E.case!enumelt` for the enum type `ty`
    fn parse_case_ref(&mut self, ty: &SilType) -> Result<usize> {
        let (owner, case, suffix, span) = self.parse_member_ref()?;
        if suffix.as_deref() != Some("enumelt") {
            return Err(Error::Expected("'!enumelt'".into(), span));
        }
        let decl = self.member_owner(ty, &owner, span)?;
        self.module
            .ast
            .decl(decl)
            .case_index(&case)
            .ok_or(Error::UnknownCase {
                ty: owner,
                case,
                span,
            })
    }

    fn case_payload(&self, ty: &SilType, case: usize) -> Option<Type> {
        let decl = ty.ty.nominal_decl()?;
        self.module.ast.decl(decl).cases().get(case)?.payload.clone()
    }

    fn parse_opcode(&mut self, st: &mut FunctionState, opcode: Opcode) -> Result<InstId> {
        let span = self.span();
        let (kind, operands, results): (InstKind, Vec<ValueId>, Vec<SilType>) = match opcode {
            Opcode::IntegerLiteral => {
                let ty = self.parse_sil_type()?;
                if ty.is_address || ty.ty.builtin_integer_width().is_none() {
                    return Err(Error::Expected("builtin integer type".into(), span));
                }
                self.expect(TokenKind::Comma)?;
                let (value, _) = self.expect_integer()?;
                (InstKind::IntegerLiteral { value }, vec![], vec![ty])
            }
            Opcode::FloatLiteral => {
                let ty = self.parse_sil_type()?;
                if !matches!(ty.ty, Type::Builtin(BuiltinType::Float(_))) {
                    return Err(Error::Expected("builtin float type".into(), span));
                }
                self.expect(TokenKind::Comma)?;
                let (bits, bits_span) = self.expect_integer()?;
                let bits = u64::try_from(bits).map_err(|_| Error::InvalidLiteral {
                    text: bits.to_string(),
                    span: bits_span,
                })?;
                (InstKind::FloatLiteral { bits }, vec![], vec![ty])
            }
            Opcode::StringLiteral => {
                let (encoding, enc_span) = self.expect_ident("string encoding")?;
                let encoding = StringEncoding::from_str(&encoding)
                    .map_err(|_| Error::UnknownAttribute {
                        name: encoding,
                        span: enc_span,
                    })?;
                let (value, _) = self.expect_string()?;
                (
                    InstKind::StringLiteral { encoding, value },
                    vec![],
                    vec![SilType::object(Type::Builtin(BuiltinType::RawPointer))],
                )
            }
            Opcode::FunctionRef => {
                let (name, name_span) = self.expect_at_name()?;
                self.expect(TokenKind::Colon)?;
                let ty_span = self.span();
                let ty = self.parse_sil_type()?;
                let fn_ty = match &ty.ty {
                    Type::Function(f) if !ty.is_address => (**f).clone(),
                    _ => return Err(Error::Expected("function type".into(), ty_span)),
                };
                let function = match self.module.find_function(&name) {
                    Some(id) => {
                        let known =
                            SilType::object(Type::Function(Box::new(self.module.function(id).ty.clone())));
                        if known != ty {
                            return Err(self.type_mismatch(&known, &ty, ty_span));
                        }
                        id
                    }
                    None => {
                        trace!("forward reference to @{}", name);
                        self.forward_functions.insert(name.clone(), name_span);
                        self.module
                            .add_unplaced_function(Function::new(name, fn_ty))
                    }
                };
                (InstKind::FunctionRef { function }, vec![], vec![ty])
            }
            Opcode::GlobalAddr => {
                let (name, name_span) = self.expect_at_name()?;
                self.expect(TokenKind::Colon)?;
                let ty_span = self.span();
                let ty = self.parse_sil_type()?;
                let global = self
                    .module
                    .find_global(&name)
                    .ok_or(Error::UndefinedGlobal {
                        name,
                        span: name_span,
                    })?;
                let expected = self.module.global(global).ty.address_type();
                if expected != ty {
                    return Err(self.type_mismatch(&expected, &ty, ty_span));
                }
                (InstKind::GlobalAddr { global }, vec![], vec![ty])
            }
            Opcode::Tuple => {
                let elements = self.parse_typed_value_list(st)?;
                let ty = Type::Tuple(
                    elements
                        .iter()
                        .map(|v| st.func.value_type(*v).ty.clone())
                        .collect(),
                );
                (InstKind::Tuple, elements, vec![SilType::object(ty)])
            }
            Opcode::TupleExtract => {
                let tuple = self.parse_typed_value(st)?;
                self.expect(TokenKind::Comma)?;
                let (index, index_span) = self.expect_integer()?;
                let element = match &st.func.value_type(tuple).ty {
                    Type::Tuple(elements) if !st.func.value_type(tuple).is_address => usize::try_from(index)
                        .ok()
                        .and_then(|i| elements.get(i).cloned()),
                    _ => return Err(Error::Expected("tuple operand".into(), span)),
                };
                let element = element.ok_or(Error::InvalidLiteral {
                    text: index.to_string(),
                    span: index_span,
                })?;
                (
                    InstKind::TupleExtract {
                        index: index as usize,
                    },
                    vec![tuple],
                    vec![SilType::object(element)],
                )
            }
            Opcode::Struct => {
                let ty = self.parse_sil_type()?;
                let fields: Vec<Type> = match ty.ty.nominal_decl().map(|d| &self.module.ast.decl(d).kind) {
                    Some(DeclKind::Struct { fields }) if !ty.is_address => {
                        fields.iter().map(|f| f.ty.clone()).collect()
                    }
                    _ => return Err(Error::Expected("struct type".into(), span)),
                };
                let operands = self.parse_typed_value_list(st)?;
                if operands.len() != fields.len() {
                    return Err(Error::ArgCountMismatch {
                        expected: fields.len(),
                        got: operands.len(),
                        span,
                    });
                }
                for (op, field) in operands.iter().zip(&fields) {
                    let expected = SilType::object(field.clone());
                    if st.func.value_type(*op) != &expected {
                        return Err(self.type_mismatch(&expected, st.func.value_type(*op), span));
                    }
                }
                (InstKind::Struct, operands, vec![ty])
            }
            Opcode::StructExtract => {
                let operand = self.parse_typed_value(st)?;
                self.expect(TokenKind::Comma)?;
                let (owner, field, _, ref_span) = self.parse_member_ref()?;
                let ty = st.func.value_type(operand).clone();
                let decl = self.member_owner(&ty, &owner, ref_span)?;
                let decl = self.module.ast.decl(decl);
                let index = match (&decl.kind, decl.field_index(&field)) {
                    (DeclKind::Struct { .. }, Some(i)) if !ty.is_address => i,
                    _ => {
                        return Err(Error::UnknownField {
                            ty: owner,
                            field,
                            span: ref_span,
                        })
                    }
                };
                let field_ty = decl.fields()[index].ty.clone();
                (
                    InstKind::StructExtract { field: index },
                    vec![operand],
                    vec![SilType::object(field_ty)],
                )
            }
            Opcode::Enum => {
                let ty = self.parse_sil_type()?;
                self.expect(TokenKind::Comma)?;
                let case = self.parse_case_ref(&ty)?;
                let payload_ty = self.case_payload(&ty, case);
                let operands = match payload_ty {
                    Some(payload_ty) => {
                        self.expect(TokenKind::Comma)?;
                        let payload = self.parse_typed_value(st)?;
                        let expected = SilType::object(payload_ty);
                        if st.func.value_type(payload) != &expected {
                            return Err(self.type_mismatch(&expected, st.func.value_type(payload), span));
                        }
                        vec![payload]
                    }
                    None => vec![],
                };
                (InstKind::Enum { case }, operands, vec![ty])
            }
            Opcode::UncheckedEnumData => {
                let operand = self.parse_typed_value(st)?;
                self.expect(TokenKind::Comma)?;
                let ty = st.func.value_type(operand).clone();
                let case = self.parse_case_ref(&ty)?;
                let payload = self
                    .case_payload(&ty, case)
                    .ok_or(Error::Expected("case with a payload".into(), span))?;
                (
                    InstKind::UncheckedEnumData { case },
                    vec![operand],
                    vec![SilType::object(payload)],
                )
            }
            Opcode::SelectEnum => {
                let operand = self.parse_typed_value(st)?;
                let enum_ty = st.func.value_type(operand).clone();
                let mut cases = Vec::new();
                let mut names = Vec::new();
                let mut default = None;
                while self.check(&TokenKind::Comma) {
                    if self.peek_kind(1) == &TokenKind::Ident("case".into()) {
                        self.advance();
                        self.advance();
                        cases.push(self.parse_case_ref(&enum_ty)?);
                        self.expect(TokenKind::Colon)?;
                        names.push(self.parse_value_name()?);
                    } else if self.peek_kind(1) == &TokenKind::Ident("default".into()) {
                        self.advance();
                        self.advance();
                        default = Some(self.parse_value_name()?);
                        break;
                    } else {
                        break;
                    }
                }
                self.expect(TokenKind::Colon)?;
                let result_ty = self.parse_sil_type()?;
                let mut operands = vec![operand];
                let has_default = default.is_some();
                for (name, span) in names.into_iter().chain(default) {
                    operands.push(self.resolve_value(st, name, result_ty.clone(), span)?);
                }
                (InstKind::SelectEnum { cases, has_default }, operands, vec![result_ty])
            }
            Opcode::Builtin => {
                let (name, _) = self.expect_string()?;
                let operands = self.parse_typed_value_list(st)?;
                self.expect(TokenKind::Colon)?;
                let ty = self.parse_sil_type()?;
                (InstKind::Builtin { name }, operands, vec![ty])
            }
            Opcode::Apply => {
                let callee = self.parse_value_name()?;
                self.expect(TokenKind::LParen)?;
                let mut args = Vec::new();
                if !self.check(&TokenKind::RParen) {
                    loop {
                        args.push(self.parse_value_name()?);
                        if !self.consume(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RParen)?;
                self.expect(TokenKind::Colon)?;
                let ty_span = self.span();
                let callee_ty = self.parse_sil_type()?;
                let fn_ty = match &callee_ty.ty {
                    Type::Function(f) if !callee_ty.is_address => (**f).clone(),
                    _ => return Err(Error::Expected("function type".into(), ty_span)),
                };
                if args.len() != fn_ty.params.len() {
                    return Err(Error::ArgCountMismatch {
                        expected: fn_ty.params.len(),
                        got: args.len(),
                        span,
                    });
                }
                let mut operands = vec![self.resolve_value(st, callee.0, callee_ty, callee.1)?];
                for (i, (name, arg_span)) in args.into_iter().enumerate() {
                    operands.push(self.resolve_value(st, name, fn_ty.argument_type(i), arg_span)?);
                }
                (InstKind::Apply, operands, vec![fn_ty.result_type()])
            }
            Opcode::StrongRetain | Opcode::StrongRelease | Opcode::DestroyValue | Opcode::CopyValue => {
                let operand = self.parse_typed_value(st)?;
                let ty = st.func.value_type(operand).clone();
                if ty.is_address {
                    return Err(Error::Expected("object operand".into(), span));
                }
                let (kind, results) = match opcode {
                    Opcode::StrongRetain => (InstKind::StrongRetain, vec![]),
                    Opcode::StrongRelease => (InstKind::StrongRelease, vec![]),
                    Opcode::DestroyValue => (InstKind::DestroyValue, vec![]),
                    _ => (InstKind::CopyValue, vec![ty]),
                };
                (kind, vec![operand], results)
            }
            Opcode::AllocStack => {
                let mut dynamic_lifetime = false;
                while self.consume(&TokenKind::LBracket) {
                    let (attr, attr_span) = self.expect_ident("attribute")?;
                    if attr != "dynamic_lifetime" {
                        return Err(Error::UnknownAttribute {
                            name: attr,
                            span: attr_span,
                        });
                    }
                    dynamic_lifetime = true;
                    self.expect(TokenKind::RBracket)?;
                }
                let ty = self.parse_sil_type()?;
                (
                    InstKind::AllocStack { dynamic_lifetime },
                    vec![],
                    vec![ty.address_type()],
                )
            }
            Opcode::DeallocStack => {
                let operand = self.parse_typed_value(st)?;
                if !st.func.value_type(operand).is_address {
                    return Err(Error::Expected("address operand".into(), span));
                }
                (InstKind::DeallocStack, vec![operand], vec![])
            }
            Opcode::Load => {
                let qualifier = self.parse_qualifier(LoadQualifier::from_keyword)?;
                let operand = self.parse_typed_value(st)?;
                let ty = st.func.value_type(operand).clone();
                if !ty.is_address {
                    return Err(Error::Expected("address operand".into(), span));
                }
                (
                    InstKind::Load {
                        qualifier: qualifier.unwrap_or_default(),
                    },
                    vec![operand],
                    vec![ty.object_type()],
                )
            }
            Opcode::Store => {
                let (src, src_span) = self.parse_value_name()?;
                self.expect_keyword("to")?;
                let qualifier = self.parse_qualifier(StoreQualifier::from_keyword)?;
                let dest = self.parse_typed_value(st)?;
                let dest_ty = st.func.value_type(dest).clone();
                if !dest_ty.is_address {
                    return Err(Error::Expected("address operand".into(), span));
                }
                let src = self.resolve_value(st, src, dest_ty.object_type(), src_span)?;
                (
                    InstKind::Store {
                        qualifier: qualifier.unwrap_or_default(),
                    },
                    vec![src, dest],
                    vec![],
                )
            }
            Opcode::ClassMethod | Opcode::ObjcMethod => {
                let operand = self.parse_typed_value(st)?;
                self.expect(TokenKind::Comma)?;
                let (owner, method, suffix, ref_span) = self.parse_member_ref()?;
                let foreign = suffix.as_deref() == Some("foreign");
                if foreign != (opcode == Opcode::ObjcMethod) || (suffix.is_some() && !foreign) {
                    return Err(Error::Expected(
                        if foreign { "native method reference" } else { "'!foreign'" }.into(),
                        ref_span,
                    ));
                }
                let class = self
                    .module
                    .ast
                    .lookup_any(&owner)
                    .ok_or(Error::UnknownType {
                        name: owner.clone(),
                        span: ref_span,
                    })?;
                let member = self
                    .module
                    .ast
                    .lookup_member(class, &method)
                    .ok_or(Error::UnknownField {
                        ty: owner,
                        field: method,
                        span: ref_span,
                    })?;
                self.expect(TokenKind::Colon)?;
                let ty_span = self.span();
                let ty = self.parse_sil_type()?;
                if ty.ty.as_function().is_none() {
                    return Err(Error::Expected("function type".into(), ty_span));
                }
                let kind = if foreign {
                    InstKind::ObjcMethod { member }
                } else {
                    InstKind::ClassMethod { member }
                };
                (kind, vec![operand], vec![ty])
            }
            Opcode::CondFail => {
                let cond = self.parse_typed_value(st)?;
                if !st.func.value_type(cond).is_int1() {
                    return Err(self.type_mismatch(&SilType::int(1), st.func.value_type(cond), span));
                }
                let message = match self.peek_kind(1) {
                    TokenKind::StringLit(_) if self.check(&TokenKind::Comma) => {
                        self.advance();
                        self.expect_string()?.0
                    }
                    _ => String::new(),
                };
                (InstKind::CondFail { message }, vec![cond], vec![])
            }
            Opcode::Br => {
                let (dest, args) = self.parse_branch_dest(st)?;
                (InstKind::Br { dest }, args, vec![])
            }
            Opcode::CondBr => {
                let (cond, cond_span) = self.parse_value_name()?;
                let cond = self.resolve_value(st, cond, SilType::int(1), cond_span)?;
                self.expect(TokenKind::Comma)?;
                let (true_dest, true_args) = self.parse_branch_dest(st)?;
                self.expect(TokenKind::Comma)?;
                let (false_dest, false_args) = self.parse_branch_dest(st)?;
                let true_arg_count = true_args.len();
                let mut operands = vec![cond];
                operands.extend(true_args);
                operands.extend(false_args);
                (
                    InstKind::CondBr {
                        true_dest,
                        false_dest,
                        true_arg_count,
                    },
                    operands,
                    vec![],
                )
            }
            Opcode::SwitchValue => {
                let operand = self.parse_typed_value(st)?;
                if st.func.value_type(operand).ty.builtin_integer_width().is_none() {
                    return Err(Error::Expected("builtin integer operand".into(), span));
                }
                let mut cases = Vec::new();
                let mut default = None;
                while self.check(&TokenKind::Comma) && default.is_none() {
                    if self.peek_kind(1) == &TokenKind::Ident("case".into()) {
                        self.advance();
                        self.advance();
                        let (value, _) = self.expect_integer()?;
                        self.expect(TokenKind::Colon)?;
                        let (dest, dest_span) = self.expect_ident("basic block")?;
                        cases.push((value, st.use_block(&dest, dest_span)));
                    } else if self.peek_kind(1) == &TokenKind::Ident("default".into()) {
                        self.advance();
                        self.advance();
                        let (dest, dest_span) = self.expect_ident("basic block")?;
                        default = Some(st.use_block(&dest, dest_span));
                    } else {
                        break;
                    }
                }
                (InstKind::SwitchValue { cases, default }, vec![operand], vec![])
            }
            Opcode::SwitchEnum => {
                let operand = self.parse_typed_value(st)?;
                let enum_ty = st.func.value_type(operand).clone();
                let mut cases = Vec::new();
                let mut default = None;
                while self.check(&TokenKind::Comma) && default.is_none() {
                    if self.peek_kind(1) == &TokenKind::Ident("case".into()) {
                        self.advance();
                        self.advance();
                        let case = self.parse_case_ref(&enum_ty)?;
                        self.expect(TokenKind::Colon)?;
                        let (dest, dest_span) = self.expect_ident("basic block")?;
                        cases.push((case, st.use_block(&dest, dest_span)));
                    } else if self.peek_kind(1) == &TokenKind::Ident("default".into()) {
                        self.advance();
                        self.advance();
                        let (dest, dest_span) = self.expect_ident("basic block")?;
                        default = Some(st.use_block(&dest, dest_span));
                    } else {
                        break;
                    }
                }
                (InstKind::SwitchEnum { cases, default }, vec![operand], vec![])
            }
            Opcode::Return | Opcode::Throw => {
                let operand = self.parse_typed_value(st)?;
                let kind = if opcode == Opcode::Return {
                    InstKind::Return
                } else {
                    InstKind::Throw
                };
                (kind, vec![operand], vec![])
            }
            Opcode::Unreachable => (InstKind::Unreachable, vec![], vec![]),
        };
        Ok(st.func.create_inst(kind, operands, results, &self.module.ast))
    }

    /// Optional `[keyword]` qualifier
    fn parse_qualifier<Q>(&mut self, from_keyword: fn(&str) -> Option<Q>) -> Result<Option<Q>> {
        if !self.consume(&TokenKind::LBracket) {
            return Ok(None);
        }
        let (word, span) = self.expect_ident("qualifier")?;
        let qualifier = from_keyword(&word).ok_or(Error::UnknownAttribute { name: word, span })?;
        self.expect(TokenKind::RBracket)?;
        Ok(Some(qualifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::ir_printer::print_module;

    fn parse_ok(source: &str) -> SilModule {
        match parse_sil(source) {
            Ok(module) => module,
            Err(diags) => panic!(
                "unexpected diagnostics:\n{}",
                diags.iter().map(|d| d.to_string()).collect::<Vec<_>>().join("\n")
            ),
        }
    }

    fn parse_err(source: &str) -> Vec<Diagnostic> {
        match parse_sil(source) {
            Ok(_) => panic!("expected a parse failure"),
            Err(diags) => diags,
        }
    }

    #[test]
    fn test_forward_block_reference() {
        let module = parse_ok(
            "sil @f : $@convention(thin) () -> () {
bb0:
  br bb2

bb1:
  unreachable

bb2:
  %0 = tuple ()
  return %0 : $()
}
",
        );
        let f = module.function(module.find_function("f").unwrap());
        let bb0 = f.entry();
        let target = f.single_successor(bb0).unwrap();
        assert_eq!(f.layout_position(target), 2);
        assert!(f.is_laid_out(target));
    }

    #[test]
    fn test_undefined_block_is_one_diagnostic() {
        let diags = parse_err(
            "sil @f : $@convention(thin) () -> () {
bb0:
  br bb9
}
",
        );
        assert_eq!(diags.len(), 1);
        assert!(matches!(&diags[0].error, Error::UndefinedBlock { name, .. } if name == "bb9"));
        assert_eq!((diags[0].line, diags[0].column), (3, 6));
    }

    #[test]
    fn test_forward_value_through_branch() {
        let module = parse_ok(
            "sil @f : $@convention(thin) (Builtin.Int1) -> Builtin.Int1 {
bb0(%0 : $Builtin.Int1):
  br bb2

bb1:
  br bb3(%5 : $Builtin.Int1)

bb2:
  %5 = integer_literal $Builtin.Int1, 0
  br bb3(%5 : $Builtin.Int1)

bb3(%6 : $Builtin.Int1):
  return %6 : $Builtin.Int1
}
",
        );
        let f = module.function(module.find_function("f").unwrap());
        assert!(f.all_insts().iter().all(|i| f.operands(*i).iter().all(|v| !f.is_placeholder(*v))));
    }

    #[test]
    fn test_forward_value_type_mismatch() {
        let diags = parse_err(
            "sil @f : $@convention(thin) () -> () {
bb0:
  br bb1(%1 : $Builtin.Int64)

bb1(%2 : $Builtin.Int64):
  %1 = integer_literal $Builtin.Int1, 0
  %3 = tuple ()
  return %3 : $()
}
",
        );
        assert!(matches!(diags[0].error, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_undefined_value() {
        let diags = parse_err(
            "sil @f : $@convention(thin) () -> Builtin.Int1 {
bb0:
  return %7 : $Builtin.Int1
}
",
        );
        assert_eq!(diags.len(), 1);
        assert!(matches!(&diags[0].error, Error::UndefinedValue { name, .. } if name == "7"));
    }

    #[test]
    fn test_ossa_entry_ownership_must_match_convention() {
        let source = "class K {
}

sil [ossa] @f : $@convention(thin) (@guaranteed K) -> () {
bb0(%0 : @owned $K):
  %1 = tuple ()
  return %1 : $()
}
";
        let diags = parse_err(source);
        assert!(matches!(diags[0].error, Error::OwnershipMismatch { .. }));

        let fixed = source.replace("%0 : @owned", "%0 : @guaranteed");
        parse_ok(&fixed);
    }

    #[test]
    fn test_ownership_annotation_requires_ossa() {
        let diags = parse_err(
            "class K {
}

sil @f : $@convention(thin) (@owned K) -> () {
bb0(%0 : @owned $K):
  %1 = tuple ()
  return %1 : $()
}
",
        );
        assert!(matches!(diags[0].error, Error::Malformed { .. }));
    }

    #[test]
    fn test_unknown_opcode_discards_module() {
        let diags = parse_err(
            "sil @f : $@convention(thin) () -> () {
bb0:
  frobnicate
}

sil @g : $@convention(thin) () -> () {
bb0:
  %0 = tuple ()
  return %0 : $()
}
",
        );
        assert_eq!(diags.len(), 1);
        assert!(matches!(diags[0].error, Error::MissingTerminator { .. } | Error::UnknownOpcode { .. }));
    }

    #[test]
    fn test_forward_function_ref() {
        let module = parse_ok(
            "sil @caller : $@convention(thin) () -> () {
bb0:
  %0 = function_ref @callee : $@convention(thin) () -> ()
  %1 = apply %0() : $@convention(thin) () -> ()
  return %1 : $()
}

sil @callee : $@convention(thin) () -> () {
bb0:
  %0 = tuple ()
  return %0 : $()
}
",
        );
        let names: Vec<_> = module.functions().map(|(_, f)| f.name.clone()).collect();
        assert_eq!(names, vec!["caller", "callee"]);
        assert!(module.function(module.find_function("callee").unwrap()).is_definition());
    }

    #[test]
    fn test_function_ref_to_undeclared_function() {
        let diags = parse_err(
            "sil @caller : $@convention(thin) () -> () {
bb0:
  %0 = function_ref @missing : $@convention(thin) () -> ()
  %1 = tuple ()
  return %1 : $()
}
",
        );
        assert_eq!(diags.len(), 1);
        assert!(matches!(&diags[0].error, Error::UndefinedFunction { name, .. } if name == "missing"));
    }

    #[test]
    fn test_instruction_after_terminator() {
        let diags = parse_err(
            "sil @f : $@convention(thin) () -> () {
bb0:
  unreachable
  %0 = tuple ()
}
",
        );
        assert!(matches!(diags[0].error, Error::Malformed { .. }));
    }

    #[test]
    fn test_round_trip_declarations() {
        let source = "sil_stage canonical

import Builtin

struct Pair {
  var a: Builtin.Int64
  var b: Builtin.NativeObject
}

enum Optional {
  case none
  case some(Builtin.Int64)
}

protocol P {
  func foo
}

sil_global hidden [let] @g : $Builtin.Int64

sil_scope 1 { loc \"a.swift\":1:1 parent @foo }

sil_scope 2 { loc \"a.swift\":2:3 parent 1 inlined_at 1 }

sil hidden @foo : $@convention(thin) (Pair) -> Builtin.Int64 {
bb0(%0 : $Pair):
  %1 = struct_extract %0 : $Pair, #Pair.a, loc \"a.swift\":3:4, scope 2
  return %1 : $Builtin.Int64
} // end sil function 'foo'

sil @bar : $@convention(thin) () -> ()

sil_witness_table hidden Pair: P module main {
  method #P.foo: @foo
}
";
        let module = parse_ok(source);
        assert_eq!(print_module(&module), source);
    }
}
