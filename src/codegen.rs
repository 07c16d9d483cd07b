use std::collections::{HashMap, HashSet};

use inkwell::{
    builder::{Builder, BuilderError},
    context::Context,
    module::Module,
    types::BasicMetadataTypeEnum,
    values::{BasicMetadataValueEnum, FloatValue, FunctionValue},
    FloatPredicate,
};

use crate::ast::{ASTNode, Expression, Function, Prototype};

#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    #[error("unknown variable name {0}")]
    UnknownVariable(String),
    #[error("invalid binary operator {0}")]
    InvalidOperator(char),
    #[error("unknown function referenced {0}")]
    UnknownFunction(String),
    #[error("incorrect number of arguments passed to {0}: expected {1}, found {2}")]
    InvalidCall(String, usize, usize),
    #[error("function {0} cannot be redefined")]
    Redefinition(String),
    #[error("function {0} was declared with {1} parameters, found {2}")]
    Redeclaration(String, usize, usize),
    #[error("failed to verify function {0}")]
    InvalidFunction(String),
    #[error(transparent)]
    Builder(#[from] BuilderError),
}

/// Lowers parsed items into LLVM IR, one module per unit.
///
/// Every prototype that lowers successfully is remembered, so a later unit
/// can call a function that lives in an earlier, already handed off module:
/// its declaration is re-emitted into the current module on first use.
/// A name that has been given a body once can never be defined again, no
/// matter which module the first body went to.
pub struct Codegen<'ctx> {
    pub context: &'ctx Context,
    pub module: Module<'ctx>,
    pub builder: Builder<'ctx>,
    module_name: String,
    named_values: HashMap<String, FloatValue<'ctx>>,
    prototypes: HashMap<String, Prototype>,
    defined: HashSet<String>,
    // declarations emitted while lowering the current item
    fresh: Vec<FunctionValue<'ctx>>,
}

impl<'ctx> Codegen<'ctx> {
    pub fn new(context: &'ctx Context, module_name: &str) -> Codegen<'ctx> {
        let module = context.create_module(module_name);
        let builder = context.create_builder();

        Codegen {
            context,
            module,
            builder,
            module_name: module_name.to_string(),
            named_values: HashMap::new(),
            prototypes: HashMap::new(),
            defined: HashSet::new(),
            fresh: Vec::new(),
        }
    }

    /// Hand off the current module and start a fresh one for the next unit.
    pub fn take_module(&mut self) -> Module<'ctx> {
        let fresh = self.context.create_module(&self.module_name);
        std::mem::replace(&mut self.module, fresh)
    }

    fn arity(&self, name: &str) -> Option<usize> {
        self.module
            .get_function(name)
            .map(|func| func.count_params() as usize)
            .or_else(|| self.prototypes.get(name).map(|proto| proto.args.len()))
    }

    fn get_function(&mut self, name: &str) -> Option<FunctionValue<'ctx>> {
        if let Some(func) = self.module.get_function(name) {
            return Some(func);
        }
        let proto = self.prototypes.get(name)?.clone();
        Some(self.declare(&proto))
    }

    fn codegen_expr(&mut self, expr: &Expression) -> Result<FloatValue<'ctx>, CodegenError> {
        match expr {
            Expression::Literal(value) => Ok(self.context.f64_type().const_float(*value)),
            Expression::Variable(name) => match self.named_values.get(name) {
                Some(var) => Ok(*var),
                None => Err(CodegenError::UnknownVariable(name.clone())),
            },
            Expression::Binary(op, left, right) => {
                let lhs = self.codegen_expr(left)?;
                let rhs = self.codegen_expr(right)?;

                match op {
                    '+' => Ok(self.builder.build_float_add(lhs, rhs, "addtmp")?),
                    '-' => Ok(self.builder.build_float_sub(lhs, rhs, "subtmp")?),
                    '*' => Ok(self.builder.build_float_mul(lhs, rhs, "multmp")?),
                    '<' => {
                        let cmp = self.builder.build_float_compare(
                            FloatPredicate::ULT,
                            lhs,
                            rhs,
                            "cmptmp",
                        )?;
                        Ok(self.builder.build_unsigned_int_to_float(
                            cmp,
                            self.context.f64_type(),
                            "booltmp",
                        )?)
                    }
                    _ => Err(CodegenError::InvalidOperator(*op)),
                }
            }
            Expression::Call(callee, args) => {
                let expected = self
                    .arity(callee)
                    .ok_or_else(|| CodegenError::UnknownFunction(callee.clone()))?;
                if expected != args.len() {
                    return Err(CodegenError::InvalidCall(
                        callee.clone(),
                        expected,
                        args.len(),
                    ));
                }

                // stops at the first argument that fails to lower
                let mut argsv: Vec<BasicMetadataValueEnum> = Vec::with_capacity(args.len());
                for arg in args {
                    argsv.push(self.codegen_expr(arg)?.into());
                }

                let func = self
                    .get_function(callee)
                    .ok_or_else(|| CodegenError::UnknownFunction(callee.clone()))?;

                self.builder
                    .build_call(func, argsv.as_slice(), "calltmp")?
                    .try_as_basic_value()
                    .left()
                    .map(|value| value.into_float_value())
                    .ok_or_else(|| CodegenError::InvalidFunction(callee.clone()))
            }
        }
    }

    fn declare(&mut self, proto: &Prototype) -> FunctionValue<'ctx> {
        let args_types = std::iter::repeat(self.context.f64_type())
            .take(proto.args.len())
            .map(|f| f.into())
            .collect::<Vec<BasicMetadataTypeEnum>>();

        let fn_type = self.context.f64_type().fn_type(args_types.as_slice(), false);
        let fn_val = self.module.add_function(proto.name.as_str(), fn_type, None);

        for (arg, name) in fn_val.get_param_iter().zip(&proto.args) {
            arg.into_float_value().set_name(name.as_str());
        }

        self.fresh.push(fn_val);
        fn_val
    }

    /// Declare `proto` in the current module, reusing an existing declaration
    /// of the same name when the parameter count agrees.
    fn lookup_or_declare(&mut self, proto: &Prototype) -> Result<FunctionValue<'ctx>, CodegenError> {
        if let Some(declared) = self.arity(&proto.name) {
            if declared != proto.args.len() {
                return Err(CodegenError::Redeclaration(
                    proto.name.clone(),
                    declared,
                    proto.args.len(),
                ));
            }
        }

        match self.get_function(&proto.name) {
            Some(existing) => Ok(existing),
            None => Ok(self.declare(proto)),
        }
    }

    pub fn compile_proto(&mut self, proto: &Prototype) -> Result<FunctionValue<'ctx>, CodegenError> {
        self.fresh.clear();
        let fn_val = self.lookup_or_declare(proto)?;
        self.prototypes.insert(proto.name.clone(), proto.clone());
        Ok(fn_val)
    }

    fn compile_body(
        &mut self,
        llvm_func: FunctionValue<'ctx>,
        function: &Function,
    ) -> Result<(), CodegenError> {
        let entry = self.context.append_basic_block(llvm_func, "entry");
        self.builder.position_at_end(entry);

        self.named_values.clear();
        self.named_values.reserve(function.prototype.args.len());
        for (arg, name) in llvm_func.get_param_iter().zip(&function.prototype.args) {
            let arg = arg.into_float_value();
            arg.set_name(name.as_str());
            self.named_values.insert(name.clone(), arg);
        }

        let body = self.codegen_expr(&function.body)?;
        self.builder.build_return(Some(&body))?;

        if llvm_func.verify(true) {
            Ok(())
        } else {
            Err(CodegenError::InvalidFunction(function.prototype.name.clone()))
        }
    }

    pub fn compile_fn(&mut self, function: &Function) -> Result<FunctionValue<'ctx>, CodegenError> {
        let proto = &function.prototype;
        if self.defined.contains(&proto.name) {
            return Err(CodegenError::Redefinition(proto.name.clone()));
        }

        self.fresh.clear();
        let llvm_func = self.lookup_or_declare(proto)?;

        if llvm_func.count_basic_blocks() > 0 {
            return Err(CodegenError::Redefinition(proto.name.clone()));
        }

        match self.compile_body(llvm_func, function) {
            Ok(()) => {
                self.fresh.clear();
                if !proto.is_anonymous() {
                    self.prototypes.insert(proto.name.clone(), proto.clone());
                    self.defined.insert(proto.name.clone());
                }
                Ok(llvm_func)
            }
            Err(err) => {
                // no partial definition, nor any declaration it pulled in,
                // may outlive a failed lowering
                for decl in self.fresh.drain(..) {
                    if decl != llvm_func {
                        unsafe { decl.delete() };
                    }
                }
                unsafe {
                    llvm_func.delete();
                }
                Err(err)
            }
        }
    }

    pub fn compile_node(&mut self, node: &ASTNode) -> Result<FunctionValue<'ctx>, CodegenError> {
        match node {
            ASTNode::Function(func) => self.compile_fn(func),
            ASTNode::Extern(proto) => self.compile_proto(proto),
        }
    }

    pub fn codegen(&mut self, ast_nodes: &[ASTNode]) -> Result<(), CodegenError> {
        for node in ast_nodes {
            let func = self.compile_node(node)?;

            // a top-level expression has served its purpose once lowered
            if let ASTNode::Function(Function { prototype, .. }) = node {
                if prototype.is_anonymous() {
                    unsafe { func.delete() };
                }
            }
        }

        Ok(())
    }
}
