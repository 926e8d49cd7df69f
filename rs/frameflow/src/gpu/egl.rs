use std::{ffi::c_void, sync::Arc};

use khronos_egl as egl;

use super::{ExternalTextureBinder, GlowGpu, Gpu, GpuContext, SurfaceTarget, ThreadAffinity};
use crate::render::{RenderError, Result};

type Instance = egl::DynamicInstance<egl::EGL1_4>;

// Connection state that exists between init and release.
struct Display {
	instance: Instance,
	display: egl::Display,
	config: egl::Config,
	context: egl::Context,
}

/// An OpenGL ES 2 context created through EGL, loaded at runtime.
pub struct EglContext {
	display: Option<Display>,
	surface: Option<(SurfaceTarget, egl::Surface)>,

	// Created the first time the context is made current.
	gpu: Option<GlowGpu>,

	binder: Option<Arc<dyn ExternalTextureBinder>>,
	affinity: ThreadAffinity,
}

// SAFETY: EGL handles are plain pointers that may be moved between threads. Using them is only
// allowed on the thread the context is current on, which ThreadAffinity checks on every call.
unsafe impl Send for EglContext {}

impl EglContext {
	pub fn new() -> Self {
		Self {
			display: None,
			surface: None,
			gpu: None,
			binder: None,
			affinity: ThreadAffinity::default(),
		}
	}

	/// Register the platform hook that binds hardware frames to external textures.
	pub fn with_binder(mut self, binder: Arc<dyn ExternalTextureBinder>) -> Self {
		self.binder = Some(binder);
		self
	}

	fn display(&self) -> Result<&Display> {
		self.display.as_ref().ok_or(RenderError::NotInitialized)
	}

	fn surface_handle(&self) -> Result<egl::Surface> {
		self.surface.map(|(_, surface)| surface).ok_or(RenderError::NoSurface)
	}

	fn connect() -> Result<Display> {
		let instance =
			unsafe { Instance::load_required() }.map_err(|e| RenderError::Egl(format!("failed to load libEGL: {e}")))?;

		let display = unsafe { instance.get_display(egl::DEFAULT_DISPLAY) }
			.ok_or_else(|| RenderError::Egl("no display".into()))?;

		let (major, minor) = instance
			.initialize(display)
			.map_err(|e| RenderError::Egl(format!("initialize: {e}")))?;

		instance
			.bind_api(egl::OPENGL_ES_API)
			.map_err(|e| RenderError::Egl(format!("bind api: {e}")))?;

		let attributes = [
			egl::RED_SIZE,
			8,
			egl::GREEN_SIZE,
			8,
			egl::BLUE_SIZE,
			8,
			egl::ALPHA_SIZE,
			8,
			egl::RENDERABLE_TYPE,
			egl::OPENGL_ES2_BIT,
			egl::SURFACE_TYPE,
			egl::WINDOW_BIT | egl::PBUFFER_BIT,
			egl::NONE,
		];

		let config = match instance.choose_first_config(display, &attributes) {
			Ok(Some(config)) => config,
			Ok(None) => {
				let _ = instance.terminate(display);
				return Err(RenderError::Egl("no matching config".into()));
			}
			Err(e) => {
				let _ = instance.terminate(display);
				return Err(RenderError::Egl(format!("choose config: {e}")));
			}
		};

		let context_attributes = [egl::CONTEXT_CLIENT_VERSION, 2, egl::NONE];
		let context = match instance.create_context(display, config, None, &context_attributes) {
			Ok(context) => context,
			Err(e) => {
				let _ = instance.terminate(display);
				return Err(RenderError::Egl(format!("create context: {e}")));
			}
		};

		tracing::info!(major, minor, "egl initialized");

		Ok(Display {
			instance,
			display,
			config,
			context,
		})
	}
}

impl Default for EglContext {
	fn default() -> Self {
		Self::new()
	}
}

impl GpuContext for EglContext {
	fn init(&mut self) -> Result<()> {
		if self.display.is_none() {
			self.display = Some(Self::connect()?);
		}
		Ok(())
	}

	fn is_initialized(&self) -> bool {
		self.display.is_some()
	}

	fn attach_surface(&mut self, target: SurfaceTarget) -> Result<()> {
		if self.surface.is_some() {
			self.detach_surface();
		}

		let display = self.display()?;
		let surface = match target {
			SurfaceTarget::Window(window) => unsafe {
				let window = window.as_ptr() as egl::NativeWindowType;
				display
					.instance
					.create_window_surface(display.display, display.config, window, None)
			},
			SurfaceTarget::Pbuffer { width, height } => {
				let attributes = [egl::WIDTH, width as egl::Int, egl::HEIGHT, height as egl::Int, egl::NONE];
				display
					.instance
					.create_pbuffer_surface(display.display, display.config, &attributes)
			}
		}
		.map_err(|e| RenderError::Egl(format!("create surface: {e}")))?;

		tracing::debug!(?target, "surface attached");
		self.surface = Some((target, surface));

		Ok(())
	}

	fn detach_surface(&mut self) {
		let Some((target, surface)) = self.surface.take() else {
			return;
		};

		if let Some(display) = self.display.as_ref() {
			// A surface that is still current is only destroyed once it is released.
			if self.affinity.check().is_ok() {
				let _ = display
					.instance
					.make_current(display.display, None, None, Some(display.context));
			}

			if let Err(e) = display.instance.destroy_surface(display.display, surface) {
				tracing::warn!(%e, "failed to destroy surface");
			}
		}

		tracing::debug!(?target, "surface detached");
	}

	fn surface(&self) -> Option<SurfaceTarget> {
		self.surface.map(|(target, _)| target)
	}

	fn make_current(&mut self) -> Result<()> {
		let surface = self.surface_handle()?;
		self.affinity.bind()?;

		let display = self.display()?;
		let current = display
			.instance
			.make_current(display.display, Some(surface), Some(surface), Some(display.context));

		if let Err(e) = current {
			self.affinity.unbind();
			return Err(RenderError::Egl(format!("make current: {e}")));
		}

		if self.gpu.is_none() {
			let instance = &display.instance;
			let gl = unsafe {
				glow::Context::from_loader_function(|name| {
					instance
						.get_proc_address(name)
						.map_or(std::ptr::null(), |f| f as *const c_void)
				})
			};

			self.gpu = Some(GlowGpu::new(gl, self.binder.clone()));
		}

		Ok(())
	}

	fn release_current(&mut self) {
		if self.affinity.check().is_err() {
			return;
		}

		if let Some(display) = self.display.as_ref() {
			if let Err(e) = display.instance.make_current(display.display, None, None, None) {
				tracing::warn!(%e, "failed to release context");
			}
		}

		self.affinity.unbind();
	}

	fn surface_size(&self) -> Result<(u32, u32)> {
		let surface = self.surface_handle()?;
		let display = self.display()?;

		let query = |attribute| {
			display
				.instance
				.query_surface(display.display, surface, attribute)
				.map_err(|e| RenderError::Egl(format!("query surface: {e}")))
		};

		Ok((query(egl::WIDTH)?.max(0) as u32, query(egl::HEIGHT)?.max(0) as u32))
	}

	fn swap_buffers(&mut self) -> Result<()> {
		self.affinity.check()?;

		let surface = self.surface_handle()?;
		let display = self.display()?;

		display
			.instance
			.swap_buffers(display.display, surface)
			.map_err(|e| RenderError::Egl(format!("swap buffers: {e}")))
	}

	fn gpu(&self) -> Result<&dyn Gpu> {
		self.affinity.check()?;
		self.gpu.as_ref().map(|gpu| gpu as &dyn Gpu).ok_or(RenderError::NotInitialized)
	}

	fn release(&mut self) {
		if let Some(gpu) = self.gpu.take() {
			// Without the context current the objects go away with the context itself.
			if self.affinity.check().is_ok() {
				gpu.destroy();
			}
		}

		self.detach_surface();
		self.release_current();

		if let Some(display) = self.display.take() {
			let _ = display.instance.make_current(display.display, None, None, None);

			if let Err(e) = display.instance.destroy_context(display.display, display.context) {
				tracing::warn!(%e, "failed to destroy context");
			}
			if let Err(e) = display.instance.terminate(display.display) {
				tracing::warn!(%e, "failed to terminate display");
			}

			tracing::info!("egl released");
		}

		self.affinity.unbind();
	}
}

impl Drop for EglContext {
	fn drop(&mut self) {
		self.release();
	}
}
